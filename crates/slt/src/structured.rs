//! Attribute proxying for structured payloads, via a reflection adapter
//! supplied per type instead of runtime reflection (design notes §9: "an
//! integer-valued leaf behaves as an integer, a struct-valued tracked
//! exposes its fields"; "reflection is not required at runtime if
//! adapters are generated per type at build time").
//!
//! Grounded on `rosslt/tracked.py`'s `__getattr__`/`__setattr__`: reading a
//! field mints (or reuses) a child [`Location`] named by the field and
//! returns a cached `Tracked` wrapper; writing one either overlays an
//! already-`Tracked` value's location or mints a fresh child and consults
//! any pending force override. The per-field memo the Python original
//! keeps on `Location.ref` lives here instead, on the wrapper itself (see
//! the design notes' remark on attribute-access memoization), and is
//! dropped whenever the struct is deep-copied.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Result, SltError};
use crate::location::{Location, LocationRef};
use crate::location_manager::LocationManager;
use crate::tracked::{infer_numeric_kind, Tracked};
use crate::value::Scalar;

/// A reflection adapter a structured payload type supplies so
/// [`TrackedStruct`] can proxy field access without runtime reflection.
/// Implement this once per payload type (by hand, or via a derive macro a
/// downstream crate could add) the way the Python original's duck typing
/// enumerates `__dict__` implicitly.
pub trait FieldAdapter {
    /// The fields this type exposes for attribute proxying, in a stable
    /// order (used only for enumeration; `get_field`/`set_field` are
    /// still looked up by name).
    fn field_names() -> &'static [&'static str];

    /// Reads `name` as a [`Scalar`]. Returns `None` for fields this
    /// adapter does not expose (never reached through
    /// [`TrackedStruct::get`]/`set`, which only use names from
    /// [`FieldAdapter::field_names`]).
    fn get_field(&self, name: &str) -> Option<Scalar>;

    /// Writes `value` into `name`.
    ///
    /// # Errors
    /// Returns [`crate::error::SltError::TypeAssertionRejected`] if the
    /// underlying field enforces a native type the incoming `value`
    /// doesn't satisfy (the analogue of the Python original's
    /// `AssertionError` from a ROS message's generated setter).
    fn set_field(&mut self, name: &str, value: Scalar) -> Result<()>;
}

/// Wraps a [`FieldAdapter`]-implementing payload, proxying its fields as
/// individually tracked children.
#[derive(Debug)]
pub struct TrackedStruct<S> {
    data: S,
    location: LocationRef,
    manager: Option<Rc<RefCell<LocationManager>>>,
    cache: RefCell<IndexMap<String, Tracked>>,
}

impl<S: FieldAdapter> TrackedStruct<S> {
    #[must_use]
    pub fn new(data: S) -> Self {
        Self { data, location: Location::new_ref(String::new(), -1), manager: None, cache: RefCell::new(IndexMap::new()) }
    }

    #[must_use]
    pub fn with_location(data: S, location: LocationRef, manager: Option<Rc<RefCell<LocationManager>>>) -> Self {
        Self { data, location, manager, cache: RefCell::new(IndexMap::new()) }
    }

    #[must_use]
    pub fn location(&self) -> &LocationRef {
        &self.location
    }

    #[must_use]
    pub fn data(&self) -> &S {
        &self.data
    }

    /// Reads field `name` as a `Tracked` child, minting its child
    /// location on first access and memoizing the wrapper for subsequent
    /// reads (the attribute-access memoization design note).
    #[must_use]
    pub fn get(&self, name: &str) -> Tracked {
        if let Some(cached) = self.cache.borrow().get(name) {
            return cached.clone();
        }
        let child = self.location.borrow_mut().content_get_or_default(name);
        if let Some(mgr) = &self.manager {
            Location::register(&child, &mut mgr.borrow_mut());
        }
        let raw = self.data.get_field(name).unwrap_or(Scalar::Int32(0));
        let kind = infer_numeric_kind(&raw);
        let read = child.borrow_mut().read_scalar(raw, kind);
        let tracked = Tracked::with_location(read, child, self.manager.clone());
        self.cache.borrow_mut().insert(name.to_owned(), tracked.clone());
        tracked
    }

    /// Writes `value` (already `Tracked`) into field `name`, overlaying
    /// its location onto the child slot rather than minting a new one —
    /// `_update_location`'s behavior for an already-tracked assignment.
    pub fn set_tracked(&mut self, name: &str, value: Tracked) -> Result<()> {
        let copied = value.location().borrow().copy(true, true, true);
        self.location.borrow_mut().content_add(name.to_owned(), Rc::new(RefCell::new(copied)));
        let outcome = self.data.set_field(name, value.raw());
        self.cache.borrow_mut().insert(name.to_owned(), value);
        outcome
    }

    /// Writes a raw (not yet tracked) `value` into field `name`, minting a
    /// fresh child location, consulting its pending force override (if
    /// any) before the write, and absorbing a
    /// [`crate::error::SltError::TypeAssertionRejected`] by keeping the
    /// scalar and its independent location rather than propagating the
    /// error — §4.3's type-assertion-rejection fallback. Returns the
    /// resulting `Tracked` child either way.
    pub fn set(&mut self, name: &str, value: Scalar) -> Tracked {
        let child = self.location.borrow_mut().content_get_or_default(name);
        if let Some(mgr) = &self.manager {
            Location::register(&child, &mut mgr.borrow_mut());
        }
        let kind = infer_numeric_kind(&value);
        let resolved = child.borrow_mut().read_scalar(value, kind);
        let tracked = Tracked::with_location(resolved, child, self.manager.clone());
        let _ = self.data.set_field(name, tracked.raw());
        self.cache.borrow_mut().insert(name.to_owned(), tracked.clone());
        tracked
    }

    /// Clears the per-field memoization cache. Callers performing a deep
    /// copy of the underlying payload should call this on the copy so
    /// stale cached children don't outlive the data they were read from.
    pub fn clear_cache(&mut self) {
        self.cache.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_config, Config};

    #[derive(Debug, Clone, Default)]
    struct Vec3 {
        x: f64,
        y: f64,
        z: f64,
    }

    impl FieldAdapter for Vec3 {
        fn field_names() -> &'static [&'static str] {
            &["x", "y", "z"]
        }

        fn get_field(&self, name: &str) -> Option<Scalar> {
            match name {
                "x" => Some(Scalar::Float(self.x)),
                "y" => Some(Scalar::Float(self.y)),
                "z" => Some(Scalar::Float(self.z)),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Scalar) -> Result<()> {
            let v = value.as_f64().ok_or(SltError::TypeAssertionRejected)?;
            match name {
                "x" => self.x = v,
                "y" => self.y = v,
                "z" => self.z = v,
                _ => return Err(SltError::Schema(format!("no such field: {name}"))),
            }
            Ok(())
        }
    }

    #[test]
    fn scenario_nested_struct_sixteen_random_mixed_ops_per_field() {
        with_config(Config { expr_chain: true, ..Config::default() }, || {
            let wrapper = TrackedStruct::new(Vec3 { x: 5.0, y: 5.0, z: 5.0 });
            for field in Vec3::field_names() {
                let mut rng = crate::util::seeded_rng(1234);
                let mut current = wrapper.get(field);
                for i in 0..16 {
                    current = crate::util::apply_random(&current, &mut rng, Scalar::Float(f64::from(i % 4) + 1.0), true).unwrap();
                }
                let original = current.get_original().unwrap();
                let Scalar::Float(original) = original else { panic!("expected float") };
                assert!((original - 5.0).abs() < 1e-2, "field {field} original was {original}");
            }
        });
    }

    #[test]
    fn attribute_read_memoizes_the_same_tracked_child() {
        let wrapper = TrackedStruct::new(Vec3::default());
        let first = wrapper.get("x");
        let second = wrapper.get("x");
        assert!(Rc::ptr_eq(first.location(), second.location()));
    }
}
