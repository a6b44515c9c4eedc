//! [`Tracked`]: the user-facing scalar wrapper that records provenance.
//!
//! Grounded on `rosslt/tracked.py`. Every arithmetic method comes in a
//! "build" form (returns a new `Tracked` whose location is a copy of this
//! one's, extended by one step — `Tracked::build`/`_build`) and an
//! "update" form (mutates `self` in place and extends its own location —
//! `Tracked::update`/`_update`), matching the Python original's
//! `__add__`/`__iadd__` pairing. The "reflected" (right-hand) forms always
//! extend the buffer with a leading `swap` so [`crate::expression::Expression::reverse`]
//! knows which operand was on which side of the stack.
//!
//! Forward evaluation can fail (division by zero, a trig domain error is
//! impossible here since `asin`/`acos` just return NaN, a string op with
//! the wrong operand kind); `std::ops` operator traits have no room for a
//! fallible `Output` without panicking, so arithmetic is exposed as named
//! methods returning [`crate::error::Result`] instead of operator
//! overloads — see `DESIGN.md` for this call.
//!
//! Bitwise `&`/`|` are deliberately not implemented: the Python original's
//! `__and__`/`__or__` alias arithmetic multiply/add (flagged in the
//! design notes as a likely placeholder rather than real bitwise
//! semantics), and carrying that over would silently mislead a caller who
//! writes `a & b` expecting a bitwise AND.

use std::rc::Rc;
use std::cell::RefCell;

use crate::error::{Result, SltError};
use crate::expression::{eval_binary_op, eval_unary_op};
use crate::location::{Location, LocationRef, NumericKind};
use crate::location_manager::LocationManager;
use crate::operator::Operator;
use crate::value::Scalar;

/// A scalar value plus the [`Location`] recording how it was derived.
#[derive(Debug, Clone)]
pub struct Tracked {
    data: Scalar,
    location: LocationRef,
    manager: Option<Rc<RefCell<LocationManager>>>,
}

/// Anything `Tracked`'s arithmetic methods accept as the other operand:
/// a raw literal, or another `Tracked` whose own provenance is discarded
/// (per §1's non-goal: histories are univariate, so combining two tracked
/// values keeps only the left-hand one's chain, mirroring the Python
/// original's `_unpack` helper).
pub trait Operand {
    fn into_scalar(self) -> Scalar;
}

impl Operand for Scalar {
    fn into_scalar(self) -> Scalar {
        self
    }
}

impl Operand for &Tracked {
    fn into_scalar(self) -> Scalar {
        self.data.clone()
    }
}

impl Operand for Tracked {
    fn into_scalar(self) -> Scalar {
        self.data
    }
}

macro_rules! operand_from {
    ($t:ty) => {
        impl Operand for $t {
            fn into_scalar(self) -> Scalar {
                Scalar::from(self)
            }
        }
    };
}
operand_from!(i32);
operand_from!(i64);
operand_from!(f64);
operand_from!(String);
operand_from!(&str);

impl Tracked {
    /// Wraps `data` in a fresh, unregistered location with no history.
    #[must_use]
    pub fn new(data: impl Operand) -> Self {
        Self { data: data.into_scalar(), location: Location::new_ref(String::new(), -1), manager: None }
    }

    /// Wraps `data` in a caller-supplied location, optionally registered
    /// with a manager (so attribute/index children it mints can register
    /// themselves, and so `force_value` has somewhere to route a
    /// `SetValue`).
    #[must_use]
    pub fn with_location(data: Scalar, location: LocationRef, manager: Option<Rc<RefCell<LocationManager>>>) -> Self {
        Self { data, location, manager }
    }

    /// The raw payload, with no provenance.
    #[must_use]
    pub fn unwrap(&self) -> &Scalar {
        &self.data
    }

    /// Consumes `self`, discarding its location.
    #[must_use]
    pub fn into_raw(self) -> Scalar {
        self.data
    }

    #[must_use]
    pub fn raw(&self) -> Scalar {
        self.data.clone()
    }

    #[must_use]
    pub fn location(&self) -> &LocationRef {
        &self.location
    }

    #[must_use]
    pub fn manager(&self) -> Option<&Rc<RefCell<LocationManager>>> {
        self.manager.as_ref()
    }

    /// Re-derives the original input by inverting this value's expression
    /// history and applying it to the current data (`get_original`, §3).
    ///
    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn get_original(&self) -> Result<Scalar> {
        let mut reversed = self.location.borrow_mut().expr.reverse();
        reversed.apply(self.data.clone())
    }

    /// Converts this value to the message shape `to_msg` produces: the
    /// raw payload plus the serialized location-tree header. The wire
    /// `Expression` inside that header stays packed until touched (P4).
    #[must_use]
    pub fn to_msg(&self) -> TrackedMessage {
        TrackedMessage { data: self.data.clone(), loc: Location::header_create(&self.location) }
    }

    /// Rebuilds a `Tracked` from a message produced by [`Tracked::to_msg`].
    /// The root location's expression remains packed (P4) until some
    /// operation forces an unpack.
    ///
    /// # Errors
    /// Returns [`crate::error::SltError::Schema`] if the header is
    /// malformed (see [`Location::from_header`]).
    pub fn from_msg(msg: TrackedMessage) -> Result<Self> {
        let location = Location::from_header(&msg.loc)?;
        Ok(Self { data: msg.data, location, manager: None })
    }

    fn build(&self, new_data: Scalar, operand: Scalar, swap: bool, op: Operator) -> Self {
        let mut new_loc = self.location.borrow().copy(true, true, true);
        new_loc.expr.append(operand, swap, op);
        Self { data: new_data, location: Rc::new(RefCell::new(new_loc)), manager: self.manager.clone() }
    }

    fn update(&mut self, new_data: Scalar, operand: Scalar, swap: bool, op: Operator) -> &mut Self {
        self.data = new_data;
        self.location.borrow_mut().expr.append(operand, swap, op);
        self
    }

    fn build_unary(&self, new_data: Scalar, op: Operator) -> Self {
        let mut new_loc = self.location.borrow().copy(true, true, true);
        new_loc.expr.append_op(op);
        Self { data: new_data, location: Rc::new(RefCell::new(new_loc)), manager: self.manager.clone() }
    }

    fn update_unary(&mut self, new_data: Scalar, op: Operator) -> &mut Self {
        self.data = new_data;
        self.location.borrow_mut().expr.append_op(op);
        self
    }

    /// `int(self._data) == int(other)`-flavored mixed-type int selection:
    /// both operands are integers, so `*`/`/` should use the integer-only
    /// `MulInt`/`DivFloor` variants that round-trip into each other,
    /// rather than the generic float-producing `Mul`/`Div`.
    fn both_int(a: &Scalar, b: &Scalar) -> bool {
        matches!(a, Scalar::Int32(_) | Scalar::Int64(_)) && matches!(b, Scalar::Int32(_) | Scalar::Int64(_))
    }

    /// `v + other` — build form.
    ///
    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn add(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Add, &self.data, &other)?;
        Ok(self.build(new_data, other, false, Operator::Add))
    }

    /// `other + v` — reflected build form (the wrapped value is the
    /// right-hand operand, so the recorded buffer carries a leading
    /// `swap`).
    ///
    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn radd(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Add, &other, &self.data)?;
        Ok(self.build(new_data, other, true, Operator::Add))
    }

    /// `v += other` — update form.
    ///
    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn iadd(&mut self, other: impl Operand) -> Result<&mut Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Add, &self.data, &other)?;
        Ok(self.update(new_data, other, false, Operator::Add))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn sub(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Sub, &self.data, &other)?;
        Ok(self.build(new_data, other, false, Operator::Sub))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn rsub(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Sub, &other, &self.data)?;
        Ok(self.build(new_data, other, true, Operator::Sub))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn isub(&mut self, other: impl Operand) -> Result<&mut Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Sub, &self.data, &other)?;
        Ok(self.update(new_data, other, false, Operator::Sub))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn mul(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let op = if Self::both_int(&self.data, &other) { Operator::MulInt } else { Operator::Mul };
        let new_data = eval_binary_op(op, &self.data, &other)?;
        Ok(self.build(new_data, other, false, op))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn rmul(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let op = if Self::both_int(&self.data, &other) { Operator::MulInt } else { Operator::Mul };
        let new_data = eval_binary_op(op, &other, &self.data)?;
        Ok(self.build(new_data, other, true, op))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn imul(&mut self, other: impl Operand) -> Result<&mut Self> {
        let other = other.into_scalar();
        let op = if Self::both_int(&self.data, &other) { Operator::MulInt } else { Operator::Mul };
        let new_data = eval_binary_op(op, &self.data, &other)?;
        Ok(self.update(new_data, other, false, op))
    }

    /// # Errors
    /// [`crate::error::SltError::InversionImpossible`] on division by
    /// zero; otherwise see [`crate::expression::Expression::apply`].
    pub fn div(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Div, &self.data, &other)?;
        Ok(self.build(new_data, other, false, Operator::Div))
    }

    /// # Errors
    /// See [`Tracked::div`].
    pub fn rdiv(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Div, &other, &self.data)?;
        Ok(self.build(new_data, other, true, Operator::Div))
    }

    /// # Errors
    /// See [`Tracked::div`].
    pub fn idiv(&mut self, other: impl Operand) -> Result<&mut Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Div, &self.data, &other)?;
        Ok(self.update(new_data, other, false, Operator::Div))
    }

    /// # Errors
    /// See [`Tracked::div`].
    pub fn floor_div(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::DivFloor, &self.data, &other)?;
        Ok(self.build(new_data, other, false, Operator::DivFloor))
    }

    /// # Errors
    /// See [`Tracked::div`].
    pub fn rfloor_div(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::DivFloor, &other, &self.data)?;
        Ok(self.build(new_data, other, true, Operator::DivFloor))
    }

    /// # Errors
    /// See [`Tracked::div`].
    pub fn ifloor_div(&mut self, other: impl Operand) -> Result<&mut Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::DivFloor, &self.data, &other)?;
        Ok(self.update(new_data, other, false, Operator::DivFloor))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn pow(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Pow, &self.data, &other)?;
        Ok(self.build(new_data, other, false, Operator::Pow))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn rpow(&self, other: impl Operand) -> Result<Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Pow, &other, &self.data)?;
        Ok(self.build(new_data, other, true, Operator::Pow))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn ipow(&mut self, other: impl Operand) -> Result<&mut Self> {
        let other = other.into_scalar();
        let new_data = eval_binary_op(Operator::Pow, &self.data, &other)?;
        Ok(self.update(new_data, other, false, Operator::Pow))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn sin(&self) -> Result<Self> {
        Ok(self.build_unary(eval_unary_op(Operator::Sin, &self.data)?, Operator::Sin))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn isin(&mut self) -> Result<&mut Self> {
        let new_data = eval_unary_op(Operator::Sin, &self.data)?;
        Ok(self.update_unary(new_data, Operator::Sin))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn cos(&self) -> Result<Self> {
        Ok(self.build_unary(eval_unary_op(Operator::Cos, &self.data)?, Operator::Cos))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn icos(&mut self) -> Result<&mut Self> {
        let new_data = eval_unary_op(Operator::Cos, &self.data)?;
        Ok(self.update_unary(new_data, Operator::Cos))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn asin(&self) -> Result<Self> {
        Ok(self.build_unary(eval_unary_op(Operator::Asin, &self.data)?, Operator::Asin))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn iasin(&mut self) -> Result<&mut Self> {
        let new_data = eval_unary_op(Operator::Asin, &self.data)?;
        Ok(self.update_unary(new_data, Operator::Asin))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn acos(&self) -> Result<Self> {
        Ok(self.build_unary(eval_unary_op(Operator::Acos, &self.data)?, Operator::Acos))
    }

    /// # Errors
    /// See [`crate::expression::Expression::apply`].
    pub fn iacos(&mut self) -> Result<&mut Self> {
        let new_data = eval_unary_op(Operator::Acos, &self.data)?;
        Ok(self.update_unary(new_data, Operator::Acos))
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl PartialEq<Scalar> for Tracked {
    fn eq(&self, other: &Scalar) -> bool {
        &self.data == other
    }
}

impl std::fmt::Display for Tracked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.data, f)
    }
}

/// The message shape `to_msg`/`from_msg` trade: the raw payload alongside
/// the serialized location-tree header (§3's `LocationHeader` wire form,
/// carried here pre-encoded rather than re-encoded per transport, since
/// transport framing is out of this crate's scope).
#[derive(Debug, Clone)]
pub struct TrackedMessage {
    pub data: Scalar,
    pub loc: crate::codec::LocationHeaderMessage,
}

/// Coerces a force override's numeric kind from the scalar it would
/// otherwise have produced, standing in for the Python original's ROS
/// field-type-name sniffing described in [`crate::location::NumericKind`].
#[must_use]
pub fn infer_numeric_kind(value: &Scalar) -> NumericKind {
    match value {
        Scalar::Int32(_) | Scalar::Int64(_) => NumericKind::IntLike,
        _ => NumericKind::FloatLike,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_config, Config};

    fn chained() -> Config {
        Config { expr_chain: true, ..Config::default() }
    }

    #[test]
    fn scenario_integer_chain() {
        with_config(chained(), || {
            let x = Tracked::new(5i32);
            let v = x.add(3i32).unwrap().mul(2i32).unwrap().sub(1i32).unwrap();
            assert_eq!(v.raw(), Scalar::Int32(17));
            assert_eq!(v.get_original().unwrap(), Scalar::Int32(5));
        });
    }

    #[test]
    fn scenario_float_with_trig() {
        with_config(chained(), || {
            let x = Tracked::new(0.3f64);
            let v = x.add(0.2f64).unwrap().sin().unwrap();
            let Scalar::Float(raw) = v.raw() else { panic!("expected float") };
            assert!((raw - (0.3_f64 + 0.2).sin()).abs() < 1e-9);
            let Scalar::Float(original) = v.get_original().unwrap() else { panic!("expected float") };
            assert!((original - 0.3).abs() < 1e-6);
        });
    }

    #[test]
    fn scenario_string_length_arithmetic() {
        with_config(chained(), || {
            let x = Tracked::new("test");
            let v = x.add("string".to_owned()).unwrap().rmul(3i32).unwrap();
            assert_eq!(v.raw(), Scalar::Str("teststringteststringteststring".into()));
            assert_eq!(v.get_original().unwrap(), Scalar::Str("test".into()));
        });
    }

    #[test]
    fn reflected_add_records_a_leading_swap() {
        with_config(chained(), || {
            let x = Tracked::new(10i32);
            let v = x.radd(3i32).unwrap();
            assert_eq!(v.raw(), Scalar::Int32(13));
            assert_eq!(v.get_original().unwrap(), Scalar::Int32(10));
        });
    }

    #[test]
    fn in_place_update_extends_the_same_location() {
        with_config(chained(), || {
            let mut v = Tracked::new(5i32);
            let before = Rc::clone(&v.location);
            v.iadd(3i32).unwrap();
            assert_eq!(v.raw(), Scalar::Int32(8));
            assert!(Rc::ptr_eq(&before, &v.location));
            assert_eq!(v.get_original().unwrap(), Scalar::Int32(5));
        });
    }

    #[test]
    fn int_times_int_selects_the_integer_only_operator() {
        with_config(chained(), || {
            let v = Tracked::new(6i32).mul(7i32).unwrap();
            assert_eq!(v.raw(), Scalar::Int32(42));
            assert_eq!(v.get_original().unwrap(), Scalar::Int32(6));
        });
    }

    #[test]
    fn division_by_zero_is_inversion_impossible() {
        with_config(chained(), || {
            let v = Tracked::new(6i32);
            assert_eq!(v.div(0i32), Err(SltError::InversionImpossible));
        });
    }

    #[test]
    fn message_round_trip_preserves_raw_and_original_and_stays_lazy() {
        with_config(chained(), || {
            let x = Tracked::new(5i32);
            let v = x.add(3i32).unwrap().mul(2i32).unwrap().sub(1i32).unwrap();

            let msg = v.to_msg();
            let rebuilt = Tracked::from_msg(msg).unwrap();
            assert!(rebuilt.location().borrow_mut().expr.is_packed());

            assert_eq!(rebuilt.raw(), v.raw());
            assert_eq!(rebuilt.get_original().unwrap(), v.get_original().unwrap());
            assert!(!rebuilt.location().borrow_mut().expr.is_packed());
        });
    }

    #[test]
    fn built_values_share_their_parent_source_identity() {
        with_config(chained(), || {
            let mut mgr = LocationManager::new("proc".to_owned());
            let loc = Location::new_ref("proc".to_owned(), -1);
            Location::register(&loc, &mut mgr);
            let id = loc.borrow().id;

            let v = Tracked::with_location(Scalar::Int32(5), loc, None);
            let derived = v.add(3i32).unwrap().mul(2i32).unwrap();
            assert_eq!(derived.location().borrow().id, id);
        });
    }
}
