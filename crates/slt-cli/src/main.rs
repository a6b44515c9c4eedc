use std::process::ExitCode;

use slt::{InMemoryBus, Scalar, SourceKey, TrackingNode};

fn main() -> ExitCode {
    let bus = InMemoryBus::new();

    let producer = TrackingNode::with_transport("producer", Box::new(bus.transport_for("producer".to_owned())));
    bus.register("producer".to_owned(), producer.manager());

    let consumer = TrackingNode::with_transport("consumer", Box::new(bus.transport_for("consumer".to_owned())));
    bus.register("consumer".to_owned(), consumer.manager());

    let source = SourceKey { file: "demo", line: 1 };
    let x = consumer.location(Scalar::Int32(3), source);
    let v = match x.mul(2i32).and_then(|v| v.add(1i32)) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("error building tracked value: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!("consumer computed v = 2*x + 1 = {v} from x = {x}");

    match producer.force_value(&v, Scalar::Int32(11)) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("force_value could not invert this history");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("error forcing value: {err}");
            return ExitCode::FAILURE;
        }
    }

    let reread = consumer.location(Scalar::Int32(3), source);
    println!("producer forced v = 11; consumer's next read of x yields {reread}");

    ExitCode::SUCCESS
}
