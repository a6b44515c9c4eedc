//! Sequence/mapping container proxying for [`crate::tracked::Tracked`].
//!
//! Grounded on `rosslt/tracked.py`'s `append`/`pop`/`clear`/`__getitem__`/
//! `__setitem__`: each element gets its own child [`Location`] named by its
//! index (sequence) or key (mapping), minted lazily on first access and
//! dropped again on `pop`/`remove`.
//!
//! Resolves the design notes' open question on container iteration:
//! the Python original yields raw elements from `__iter__` (a TODO there),
//! which would silently drop provenance for anything read through a
//! `for`-loop. `TrackedList`/`TrackedMap` always yield `&Tracked` instead,
//! so iteration never loses the provenance a direct index lookup would
//! have carried — see `DESIGN.md`.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::location::{Location, LocationRef};
use crate::location_manager::LocationManager;
use crate::tracked::{infer_numeric_kind, Tracked};
use crate::value::Scalar;

/// An item being stored into a container: either a raw value (a fresh
/// child `Location` is minted for it) or an already-`Tracked` value (its
/// existing location is copied onto the child slot, matching
/// `_update_location`'s overlay-don't-replace behavior).
pub enum Stamped {
    Raw(Scalar),
    Existing(Tracked),
}

impl From<Scalar> for Stamped {
    fn from(v: Scalar) -> Self {
        Self::Raw(v)
    }
}

impl From<Tracked> for Stamped {
    fn from(v: Tracked) -> Self {
        Self::Existing(v)
    }
}

impl From<i32> for Stamped {
    fn from(v: i32) -> Self {
        Self::Raw(Scalar::from(v))
    }
}

impl From<f64> for Stamped {
    fn from(v: f64) -> Self {
        Self::Raw(Scalar::from(v))
    }
}

impl From<&str> for Stamped {
    fn from(v: &str) -> Self {
        Self::Raw(Scalar::from(v))
    }
}

fn stamp_child(stamped: Stamped, content_name: String, location: &LocationRef, manager: &Option<Rc<RefCell<LocationManager>>>) -> Tracked {
    match stamped {
        Stamped::Existing(tracked) => {
            let copied = tracked.location().borrow().copy(true, true, true);
            location.borrow_mut().content_add(content_name, Rc::new(RefCell::new(copied)));
            tracked
        }
        Stamped::Raw(value) => {
            let child = location.borrow_mut().content_get_or_default(&content_name);
            if let Some(mgr) = manager {
                Location::register(&child, &mut mgr.borrow_mut());
            }
            let kind = infer_numeric_kind(&value);
            let read = child.borrow_mut().read_scalar(value, kind);
            Tracked::with_location(read, child, manager.clone())
        }
    }
}

/// A `Vec<Tracked>` whose elements mirror the tree's `content` map, keyed
/// by their (stringified) index.
#[derive(Debug, Clone)]
pub struct TrackedList {
    items: Vec<Tracked>,
    location: LocationRef,
    manager: Option<Rc<RefCell<LocationManager>>>,
}

impl TrackedList {
    #[must_use]
    pub fn new(location: LocationRef, manager: Option<Rc<RefCell<LocationManager>>>) -> Self {
        Self { items: Vec::new(), location, manager }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends `item`, minting (or overlaying) a child location named by
    /// the new element's index.
    pub fn push(&mut self, item: impl Into<Stamped>) {
        let name = self.items.len().to_string();
        let tracked = stamp_child(item.into(), name, &self.location, &self.manager);
        self.items.push(tracked);
    }

    /// Removes and returns the last element, dropping its child location.
    pub fn pop(&mut self) -> Option<Tracked> {
        let item = self.items.pop()?;
        self.location.borrow_mut().content_remove(&self.items.len().to_string());
        Some(item)
    }

    /// Drops every element and every child location.
    pub fn clear(&mut self) {
        self.items.clear();
        self.location.borrow_mut().content_clear();
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Tracked> {
        self.items.get(index)
    }

    /// Overwrites the element at `index`, overlaying (or minting) the
    /// corresponding child location.
    pub fn set(&mut self, index: usize, item: impl Into<Stamped>) {
        let name = index.to_string();
        let tracked = stamp_child(item.into(), name, &self.location, &self.manager);
        self.items[index] = tracked;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tracked> {
        self.items.iter()
    }
}

/// A string-keyed mapping of `Tracked` values, mirroring `content` the
/// same way [`TrackedList`] does for sequences.
#[derive(Debug, Clone)]
pub struct TrackedMap {
    items: IndexMap<String, Tracked>,
    location: LocationRef,
    manager: Option<Rc<RefCell<LocationManager>>>,
}

impl TrackedMap {
    #[must_use]
    pub fn new(location: LocationRef, manager: Option<Rc<RefCell<LocationManager>>>) -> Self {
        Self { items: IndexMap::new(), location, manager }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, item: impl Into<Stamped>) {
        let key = key.into();
        let tracked = stamp_child(item.into(), key.clone(), &self.location, &self.manager);
        self.items.insert(key, tracked);
    }

    pub fn remove(&mut self, key: &str) -> Option<Tracked> {
        let removed = self.items.shift_remove(key);
        if removed.is_some() {
            self.location.borrow_mut().content_remove(key);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.location.borrow_mut().content_clear();
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Tracked> {
        self.items.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tracked)> {
        self.items.iter()
    }
}
