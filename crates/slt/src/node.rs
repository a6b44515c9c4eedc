//! [`TrackingNode`]: the explicit-stamping entry point named in §3's
//! Location lifecycle list, and the home of `force_value` (§4.3).
//!
//! Grounded on `rosslt/node.py`'s `TrackingNode`. The Python original
//! subclasses ROS's `Node` to get a node name and a publisher/subscriber
//! pair for free; this crate owns neither, so `TrackingNode` here just
//! pairs a node name with a [`LocationManager`] and leaves process
//! identity and transport wiring to the caller (see the out-of-scope note
//! in the crate-level design notes).

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Result, SltError};
use crate::location::{Location, LocationRef};
use crate::location_manager::{LocationManager, SourceKey, Transport};
use crate::tracked::{infer_numeric_kind, Tracked};
use crate::value::Scalar;

/// The two shapes `TrackingNode::location` accepts: a fresh raw value, or
/// a `Tracked` value whose nested location tree (if any) should be
/// overlaid onto the freshly-stamped source location — `node.py`'s
/// `isinstance(data, rosslt.Tracked)` branch.
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

/// Pairs a node name with the [`LocationManager`] that owns every
/// `Location` this node has stamped or registered.
pub struct TrackingNode {
    name: String,
    manager: Rc<RefCell<LocationManager>>,
}

impl TrackingNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { manager: Rc::new(RefCell::new(LocationManager::new(name.clone()))), name }
    }

    #[must_use]
    pub fn with_transport(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let name = name.into();
        let manager = Rc::new(RefCell::new(LocationManager::new(name.clone())));
        manager.borrow_mut().set_transport(transport);
        Self { manager, name }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn manager(&self) -> &Rc<RefCell<LocationManager>> {
        &self.manager
    }

    /// Stamps `data` with the `Location` this node's manager has
    /// memoized for `source`, clearing any stale history it previously
    /// carried, overlaying a nested tree if `data` was already `Tracked`,
    /// and applying any pending force override before wrapping the result
    /// — `node.py::location`.
    #[must_use]
    pub fn location(&self, data: impl Into<Stamped>, source: SourceKey) -> Tracked {
        let loc = self.manager.borrow_mut().get_location_for_source(source);
        loc.borrow_mut().clear();

        let raw = match data.into() {
            Stamped::Raw(v) => v,
            Stamped::Existing(tracked) => {
                let has_content = tracked.location().borrow().content.is_some();
                if has_content {
                    let other = tracked.location().borrow().clone();
                    loc.borrow_mut().apply(&other);
                    Location::register(&loc, &mut self.manager.borrow_mut());
                }
                tracked.into_raw()
            }
        };

        let kind = infer_numeric_kind(&raw);
        let read = loc.borrow_mut().read_scalar(raw, kind);
        Tracked::with_location(read, loc, Some(Rc::clone(&self.manager)))
    }

    /// Solves `tracked`'s expression history backwards for the source
    /// input that would make its *next* read equal `new_value`, and
    /// routes the resulting `SetValue` through this node's manager —
    /// §4.3's force-value algorithm.
    ///
    /// Returns `Ok(false)` (never an error) when the location is
    /// unregistered or the reverse-apply hits a destroyed-information
    /// inverse (division by zero): both are "force not applied" outcomes
    /// a caller can retry differently, not fatal errors.
    ///
    /// # Errors
    /// Propagates whatever the transport reports for a remote publish.
    pub fn force_value(&self, tracked: &Tracked, new_value: Scalar) -> Result<bool> {
        let loc = tracked.location();
        let id = loc.borrow().id;
        if id < 0 {
            tracing::warn!("unable to force value of object without a registered location");
            return Ok(false);
        }

        let mut reverse_expr = loc.borrow_mut().expr.reverse();
        let solved = match reverse_expr.apply(new_value) {
            Ok(v) => v,
            Err(SltError::InversionImpossible) => return Ok(false),
            Err(e) => return Err(e),
        };

        let node_name = loc.borrow().node_name.clone();
        self.manager.borrow_mut().change_location(&node_name, id, &solved.to_string())?;
        Ok(true)
    }
}
