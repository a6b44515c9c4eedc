//! Small free-standing helpers carried over from `rosslt/util.py`: a
//! whole-valued-float-to-int fold (already exposed as
//! [`crate::value::Scalar::int_convert`]; `int_convert` here is a thin
//! module-level alias matching the original's call site) and
//! `apply_random`, the seeded-random operator picker property tests
//! (P1–P3, scenario 4) drive a `Tracked` value through.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::expression::eval_binary_op;
use crate::operator::Operator;
use crate::tracked::Tracked;
use crate::value::Scalar;

/// Folds a whole-valued float back to an integer, matching
/// `rosslt/util.py::int_convert`. A thin alias over
/// [`Scalar::int_convert`] so call sites that mirror the Python module
/// function name have one to call.
#[must_use]
pub fn int_convert(value: Scalar) -> Scalar {
    value.int_convert()
}

/// Builds a deterministic, seedable RNG for property tests — seeded so a
/// failing case is reproducible without `proptest`'s shrinking machinery,
/// which this crate has no use for (see `DESIGN.md`).
#[must_use]
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Applies one of eight (or six, with `div = false`) random arithmetic
/// steps to `val`, mirroring `rosslt/util.py::apply_random`. Always
/// returns a freshly built `Tracked` (the build/update distinction the
/// Python original makes per case doesn't affect the resulting value or
/// history, since `update` just mutates what `build` would otherwise
/// allocate).
///
/// # Errors
/// Propagates whatever the underlying arithmetic method returns (e.g.
/// [`crate::error::SltError::InversionImpossible`] if `operand` lands on
/// a zero divisor).
pub fn apply_random(val: &Tracked, rng: &mut impl Rng, operand: Scalar, div: bool) -> Result<Tracked> {
    let case = rng.gen_range(1..=if div { 8 } else { 6 });
    let plus_one = eval_binary_op(Operator::Add, &operand, &Scalar::Int32(1))?;
    match case {
        1 | 4 => val.add(operand),
        2 | 5 => val.sub(operand),
        3 | 6 => val.mul(plus_one),
        7 | 8 => val.div(plus_one),
        _ => unreachable!("gen_range(1..=8) never yields outside 1..=8"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_config, Config};

    #[test]
    fn int_convert_round_trips_through_the_module_alias() {
        assert_eq!(int_convert(Scalar::Float(3.0)), Scalar::Int32(3));
    }

    #[test]
    fn apply_random_is_reversible_over_a_long_chain() {
        with_config(Config { expr_chain: true, ..Config::default() }, || {
            let mut rng = seeded_rng(42);
            let mut current = Tracked::new(2.0f64);
            for i in 0..50 {
                current = apply_random(&current, &mut rng, Scalar::Float(f64::from(i % 5) + 1.0), true).unwrap();
            }
            let original = current.get_original().unwrap();
            let Scalar::Float(original) = original else { panic!("expected float") };
            assert!((original - 2.0).abs() < 1e-1, "got {original}");
        });
    }
}
