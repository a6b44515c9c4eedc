//! [`LocationManager`]: per-process registry of [`crate::location::Location`]s
//! and the thin transport boundary used to route `SetValue`/`GetValue`
//! traffic between peers. Grounded on `rosslt/location_manager.py`; the
//! ROS publisher/subscriber/service triplet there is replaced by the
//! [`Transport`] trait, the one piece of network identity the core
//! deliberately does not own (see the out-of-scope note in the crate-level
//! design notes).

use std::collections::HashMap;
use std::rc::Rc;

use crate::codec::{GetValueRequest, GetValueResponse, SetValueMessage};
use crate::error::{Result, SltError};
use crate::location::{Location, LocationRef};

/// A caller-supplied coordinate identifying "the place in the program that
/// produced this scalar" — stands in for the Python original's ROS field
/// path or call-site tuple. Two calls with equal `(file, line)` are
/// assumed to refer to the same logical source, so they memoize onto the
/// same `Location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub file: &'static str,
    pub line: u32,
}

/// Minimal publish/request surface a concrete transport must provide. The
/// core only ever needs to broadcast a `SetValue` record and answer (or
/// ask) a `GetValue` request; everything about process identity, QoS, and
/// wire framing beyond that belongs to the transport.
pub trait Transport {
    /// Broadcasts a `SetValue` record to every peer sharing this manager's
    /// transport (the owning node applies its own published records
    /// locally without round-tripping through this call).
    fn publish_set_value(&mut self, msg: SetValueMessage);

    /// Issues a `GetValue` request to the node that owns `location` and
    /// blocks the caller's cooperative step until a response arrives or
    /// the deadline expires.
    ///
    /// # Errors
    /// Returns [`SltError::Unreachable`] on deadline expiry and
    /// [`SltError::TransportClosed`] if the transport disconnects while
    /// the request is outstanding.
    fn request_get_value(&mut self, node: &str, req: GetValueRequest) -> Result<GetValueResponse>;
}

/// Registry of `Location`s for one owning process (`node_name`), plus
/// whatever [`Transport`] it was constructed with for routing remote
/// `SetValue`/`GetValue` traffic.
pub struct LocationManager {
    node_name: String,
    locations: Vec<LocationRef>,
    location_map: HashMap<SourceKey, LocationRef>,
    transport: Option<Box<dyn Transport>>,
}

impl LocationManager {
    #[must_use]
    pub fn new(node_name: String) -> Self {
        Self { node_name, locations: Vec::new(), location_map: HashMap::new(), transport: None }
    }

    #[must_use]
    pub fn with_transport(node_name: String, transport: Box<dyn Transport>) -> Self {
        Self { node_name, locations: Vec::new(), location_map: HashMap::new(), transport: Some(transport) }
    }

    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Installs (or replaces) the transport used to route remote
    /// `SetValue`/`GetValue` traffic. Split out from the constructor so a
    /// manager can be wrapped in `Rc<RefCell<_>>` and registered with a
    /// transport hub (e.g. [`crate::transport::InMemoryBus`]) before the
    /// transport itself is built.
    pub fn set_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Assigns the next free id and stores `loc` in the flat table. Callers
    /// almost always want [`Location::register`] instead, which checks
    /// `id >= 0` first and recurses into children.
    pub fn add_location(&mut self, loc: LocationRef) -> i32 {
        let id = self.locations.len() as i32;
        self.locations.push(loc);
        id
    }

    /// Returns the `Location` memoized for `source`, registering a fresh
    /// one under the next id if this is the first time `source` has been
    /// seen.
    pub fn get_location_for_source(&mut self, source: SourceKey) -> LocationRef {
        if let Some(existing) = self.location_map.get(&source) {
            return Rc::clone(existing);
        }
        let id = self.locations.len() as i32;
        let loc = Location::new_ref(self.node_name.clone(), id);
        self.locations.push(Rc::clone(&loc));
        self.location_map.insert(source, Rc::clone(&loc));
        loc
    }

    #[must_use]
    pub fn location(&self, id: i32) -> Option<&LocationRef> {
        usize::try_from(id).ok().and_then(|idx| self.locations.get(idx))
    }

    /// Applies an incoming `SetValue` record if it targets this node and a
    /// registered location; logs and drops it otherwise (per §7's "invalid
    /// location id" handling — logged and dropped, not an error return).
    pub fn handle_set(&mut self, msg: &SetValueMessage) {
        if msg.node != self.node_name {
            return;
        }
        match self.location(msg.location) {
            Some(loc) => loc.borrow_mut().set_force(msg.value.clone()),
            None => tracing::warn!(location = msg.location, "invalid location id"),
        }
    }

    /// Answers a `GetValue` request for a location on this node.
    #[must_use]
    pub fn handle_get(&self, req: &GetValueRequest) -> GetValueResponse {
        match self.location(req.location) {
            Some(loc) => match loc.borrow().current_value() {
                Some(value) => GetValueResponse { value: value.to_string(), valid: true },
                None => GetValueResponse { value: String::new(), valid: false },
            },
            None => GetValueResponse { value: String::new(), valid: false },
        }
    }

    /// Routes a value change: applies it locally if `node_name` is this
    /// manager's own node, otherwise publishes it over the transport.
    ///
    /// # Errors
    /// Propagates whatever the transport reports for a remote publish
    /// (there is no failure mode for the local-apply path).
    pub fn change_location(&mut self, node_name: &str, loc_id: i32, new_value: &str) -> Result<()> {
        let msg = SetValueMessage { node: node_name.to_owned(), location: loc_id, value: new_value.to_owned() };
        if node_name == self.node_name {
            self.handle_set(&msg);
            Ok(())
        } else {
            self.transport.as_mut().map_or(Err(SltError::TransportClosed), |t| {
                t.publish_set_value(msg);
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_location_for_source_memoizes_across_calls() {
        let mut mgr = LocationManager::new("proc".to_owned());
        let key = SourceKey { file: "demo.rs", line: 42 };
        let first = mgr.get_location_for_source(key.clone());
        let second = mgr.get_location_for_source(key);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn handle_set_applies_locally_and_ignores_other_nodes() {
        let mut mgr = LocationManager::new("proc".to_owned());
        let loc = Location::new_ref("proc".to_owned(), -1);
        let id = mgr.add_location(Rc::clone(&loc));
        loc.borrow_mut().id = id;

        mgr.handle_set(&SetValueMessage { node: "other".to_owned(), location: id, value: "1".to_owned() });
        assert!(!loc.borrow().has_pending_force());

        mgr.handle_set(&SetValueMessage { node: "proc".to_owned(), location: id, value: "1".to_owned() });
        assert!(loc.borrow().has_pending_force());
    }

    #[test]
    fn handle_set_with_invalid_id_is_dropped_not_fatal() {
        let mut mgr = LocationManager::new("proc".to_owned());
        mgr.handle_set(&SetValueMessage { node: "proc".to_owned(), location: 99, value: "1".to_owned() });
    }

    #[test]
    fn change_location_without_transport_errors_for_remote_node() {
        let mut mgr = LocationManager::new("proc".to_owned());
        let result = mgr.change_location("other", 0, "1");
        assert_eq!(result, Err(SltError::TransportClosed));
    }
}
