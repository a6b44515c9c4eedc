//! [`Scalar`]: the tagged value type flowing through an
//! [`crate::expression::Expression`]'s stack.
//!
//! The Python original dispatches arithmetic dynamically across whatever
//! duck-typed value shows up (`int`, `float`, `complex`, `str`); a Rust
//! crate needs a closed, exhaustively-matchable stand-in, so `Scalar` plays
//! that role (see the design notes' remark on dynamic dispatch on value
//! variants). `Int32`/`Int64` are split out, rather than collapsed to a
//! single integer variant, because the wire form picks between `INT32` and
//! `INT64` tags depending on whether a value still fits in 32 bits — see
//! [`Scalar::wire_tag`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single value a stack-based [`crate::expression::Expression`] can hold
/// or produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int32(i32),
    Int64(i64),
    Float(f64),
    /// `(real, imaginary)`. The Python original supports `complex` as a
    /// first-class numeric type; `Sin`/`Cos`/`Pow` etc. never produce one,
    /// but addition/multiplication of two complex literals does.
    Complex(f64, f64),
    Str(String),
}

/// Literal type tags used in the element byte array (see
/// [`crate::codec`]). Operator codes live above 64; these stay below it so
/// the two namespaces never collide.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTag {
    Int32 = 1,
    Int64 = 2,
    Double = 3,
    Complex = 4,
    Str = 5,
}

impl Scalar {
    /// Narrows an `i64` to `Int32` when it fits, otherwise keeps it as
    /// `Int64`. Used after integer arithmetic that may have overflowed
    /// `i32`, matching the Python original's implicit bignum-to-wire
    /// fallback (there, any `int` that exceeds the wire's 32-bit field is
    /// sent as the 64-bit field instead; here we model "exceeds 32 bits" as
    /// "doesn't fit in `i32`" directly, since Rust's `i64` has no further
    /// widening tier).
    #[must_use]
    pub fn int_narrow(value: i64) -> Self {
        i32::try_from(value).map_or(Self::Int64(value), Self::Int32)
    }

    /// The wire tag this value will be encoded with.
    #[must_use]
    pub const fn wire_tag(&self) -> WireTag {
        match self {
            Self::Int32(_) => WireTag::Int32,
            Self::Int64(_) => WireTag::Int64,
            Self::Float(_) => WireTag::Double,
            Self::Complex(..) => WireTag::Complex,
            Self::Str(_) => WireTag::Str,
        }
    }

    /// Best-effort conversion to `f64`, used by trig operators and by
    /// fusion's neutral-element comparison. Returns `None` for `Str` and
    /// `Complex`, which have no single real-number representation.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Complex(..) | Self::Str(_) => None,
        }
    }

    /// Whether this value is an integer represented exactly (`Int32`,
    /// `Int64`, or a `Float` with no fractional part) — mirrors the Python
    /// original's `util.int_convert`, which folds a whole-valued float back
    /// to `int` before further arithmetic.
    #[must_use]
    pub fn int_convert(self) -> Self {
        match self {
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Self::int_narrow(v as i64),
            other => other,
        }
    }

    /// True if this value equals the operator's neutral element, so a
    /// fusing append can drop the step entirely (e.g. `+ 0`, `* 1`).
    #[must_use]
    pub fn equals_neutral(&self, neutral: i64) -> bool {
        match self {
            Self::Int32(v) => i64::from(*v) == neutral,
            Self::Int64(v) => *v == neutral,
            Self::Float(v) => *v == neutral as f64,
            Self::Complex(re, im) => *re == neutral as f64 && *im == 0.0,
            Self::Str(_) => false,
        }
    }
}

impl Scalar {
    /// Renders this value as a token for the `;`-separated string form of
    /// an expression (see `expression::Expression`'s string form). Strings
    /// are quoted, floats always carry a `.`, complex values always carry
    /// a `j`, so the parser can disambiguate a token's kind without extra
    /// metadata.
    #[must_use]
    pub fn to_token(&self) -> String {
        match self {
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float(v) => {
                let s = v.to_string();
                if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            Self::Complex(re, im) => format!("({re}+{im}j)"),
            Self::Str(s) => format!("'{s}'"),
        }
    }

    /// Parses a single token produced by [`Scalar::to_token`]. Returns
    /// `None` if `tok` matches none of the recognized literal shapes
    /// (callers fall back to checking the operator glyph table first, per
    /// the string form's disambiguation rule).
    #[must_use]
    pub fn from_token(tok: &str) -> Option<Self> {
        if let Some(rest) = tok.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            return Some(Self::Str(rest.to_owned()));
        }
        if let Some(rest) = tok.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            return Some(Self::Str(rest.to_owned()));
        }
        if tok.contains('j') {
            return parse_complex(tok).map(|(re, im)| Self::Complex(re, im));
        }
        if tok.contains('.') {
            return tok.parse::<f64>().ok().map(Self::Float);
        }
        tok.parse::<i64>().ok().map(Self::int_narrow)
    }
}

/// Best-effort parse of a `"a+bj"` / `"a-bj"` / `"bj"` complex literal,
/// optionally wrapped in parentheses. Does not attempt to disambiguate an
/// exponent's sign from the real/imaginary split, unlike Python's `complex()`
/// grammar — adequate for the round-tripped literals this crate itself
/// produces via `to_token`, which never uses scientific notation.
fn parse_complex(tok: &str) -> Option<(f64, f64)> {
    let inner = tok.strip_prefix('(').and_then(|t| t.strip_suffix(')')).unwrap_or(tok);
    let body = inner.strip_suffix('j')?;
    if body.is_empty() {
        return Some((0.0, 1.0));
    }
    if body == "-" {
        return Some((0.0, -1.0));
    }
    let split = body.char_indices().skip(1).rev().find(|(_, c)| *c == '+' || *c == '-');
    match split {
        Some((idx, _)) => {
            let (re_part, im_part) = body.split_at(idx);
            let re = re_part.parse::<f64>().ok()?;
            let im = im_part.parse::<f64>().ok()?;
            Some((re, im))
        }
        None => body.parse::<f64>().ok().map(|im| (0.0, im)),
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Complex(re, im) => write!(f, "({re}+{im}j)"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::int_narrow(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_narrow_keeps_small_values_in_int32() {
        assert_eq!(Scalar::int_narrow(42), Scalar::Int32(42));
    }

    #[test]
    fn int_narrow_widens_overflowing_values() {
        let huge = i64::from(i32::MAX) + 1;
        assert_eq!(Scalar::int_narrow(huge), Scalar::Int64(huge));
    }

    #[test]
    fn int_convert_folds_whole_floats() {
        assert_eq!(Scalar::Float(3.0).int_convert(), Scalar::Int32(3));
        assert_eq!(Scalar::Float(3.5).int_convert(), Scalar::Float(3.5));
    }

    #[test]
    fn equals_neutral_matches_across_numeric_variants() {
        assert!(Scalar::Int32(0).equals_neutral(0));
        assert!(Scalar::Int64(1).equals_neutral(1));
        assert!(Scalar::Float(0.0).equals_neutral(0));
        assert!(!Scalar::Str("x".into()).equals_neutral(0));
    }

    #[test]
    fn token_round_trips_ints_floats_and_strings() {
        assert_eq!(Scalar::from_token(&Scalar::Int32(5).to_token()), Some(Scalar::Int32(5)));
        assert_eq!(Scalar::from_token(&Scalar::Float(2.5).to_token()), Some(Scalar::Float(2.5)));
        assert_eq!(Scalar::from_token(&Scalar::Str("hi".into()).to_token()), Some(Scalar::Str("hi".into())));
    }

    #[test]
    fn token_round_trips_complex() {
        let original = Scalar::Complex(1.0, 2.0);
        assert_eq!(Scalar::from_token(&original.to_token()), Some(original));
    }
}
