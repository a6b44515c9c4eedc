#![doc = include_str!("../../../README.md")]

pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod expression;
pub mod location;
pub mod location_manager;
pub mod node;
pub mod operator;
pub mod structured;
pub mod tracked;
pub mod transport;
pub mod util;
pub mod value;

pub use crate::{
    codec::{Compression, ExpressionMessage, GetValueRequest, GetValueResponse, LocationHeaderMessage, LocationMessage, SetValueMessage},
    config::{config, config_load, config_parse, set_config, with_config, Config},
    container::{TrackedList, TrackedMap},
    error::{Result, SltError},
    expression::{Element, Expression},
    location::{Location, LocationRef, NumericKind},
    location_manager::{LocationManager, SourceKey, Transport},
    node::TrackingNode,
    operator::Operator,
    structured::{FieldAdapter, TrackedStruct},
    tracked::{Tracked, TrackedMessage},
    transport::{InMemoryBus, InMemoryTransport},
    value::{Scalar, WireTag},
};
