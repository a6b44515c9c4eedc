//! An in-memory [`Transport`] double: every process the §1 "out of
//! scope" line names (process/network identity, pub/sub transport, the
//! monitor GUI) lives outside this crate, but the core still needs
//! *something* implementing [`crate::location_manager::Transport`] to
//! exercise the multi-node force-value/get-value scenarios in tests and
//! the demo binary. Grounded on the shape of [`crate::location_manager`]'s
//! own `Transport` trait; there is no teacher precedent for a pub/sub bus,
//! so this follows plain Rust `Rc<RefCell<_>>` fan-out instead of
//! borrowing a specific crate's messaging idiom.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::codec::{GetValueRequest, GetValueResponse, SetValueMessage};
use crate::error::{Result, SltError};
use crate::location_manager::{LocationManager, Transport};

/// Shared registry of every node's [`LocationManager`] reachable over this
/// bus. Holds only weak references so a node going out of scope doesn't
/// keep every other node alive through the bus.
#[derive(Default)]
pub struct InMemoryBus {
    nodes: RefCell<HashMap<String, Weak<RefCell<LocationManager>>>>,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registers `mgr` under `node_name` so other nodes' transports can
    /// route `SetValue`/`GetValue` traffic to it.
    pub fn register(self: &Rc<Self>, node_name: String, mgr: &Rc<RefCell<LocationManager>>) {
        self.nodes.borrow_mut().insert(node_name, Rc::downgrade(mgr));
    }

    /// Builds a [`Transport`] handle for `node_name`, to be installed on
    /// that node's own `LocationManager` via
    /// [`LocationManager::set_transport`].
    #[must_use]
    pub fn transport_for(self: &Rc<Self>, node_name: String) -> InMemoryTransport {
        InMemoryTransport { bus: Rc::clone(self), node_name }
    }

    fn lookup(&self, node_name: &str) -> Option<Rc<RefCell<LocationManager>>> {
        self.nodes.borrow().get(node_name).and_then(Weak::upgrade)
    }
}

/// A [`Transport`] that delivers `SetValue`/`GetValue` traffic directly to
/// sibling [`LocationManager`]s registered on the same [`InMemoryBus`],
/// synchronously, within the calling thread. Suited to tests and the demo
/// binary; a real deployment would route these same two operations over
/// whatever pub/sub transport the owning process uses (see §1).
pub struct InMemoryTransport {
    bus: Rc<InMemoryBus>,
    node_name: String,
}

impl Transport for InMemoryTransport {
    fn publish_set_value(&mut self, msg: SetValueMessage) {
        match self.bus.lookup(&msg.node) {
            Some(target) => target.borrow_mut().handle_set(&msg),
            None => tracing::warn!(node = %msg.node, "set-value published to an unknown node"),
        }
    }

    fn request_get_value(&mut self, node: &str, req: GetValueRequest) -> Result<GetValueResponse> {
        self.bus.lookup(node).map_or(Err(SltError::Unreachable), |target| Ok(target.borrow().handle_get(&req)))
    }
}

impl InMemoryTransport {
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }
}
