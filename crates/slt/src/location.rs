//! [`Location`]: a node in the per-value provenance tree.
//!
//! A tree of `Location`s mirrors the shape of whatever structured data a
//! [`crate::tracked::Tracked`] wraps: a scalar leaf owns an
//! [`crate::expression::Expression`] directly, a struct/sequence/mapping
//! owns a `content` map of named children. Grounded on
//! `rosslt/location.py`.
//!
//! Children are held behind `Rc<RefCell<Location>>` rather than owned
//! directly: once a `Location` is registered with a
//! [`crate::location_manager::LocationManager`], the manager's flat
//! `id -> Location` table and the tree both need to see the same mutable
//! node, so a `SetValue` landing in the manager is visible the next time
//! the owning `Tracked` wrapper reads through the tree (see the crate-level
//! design notes' discussion of the cyclic back-reference open question).

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::codec::{LocationHeaderMessage, LocationMessage};
use crate::error::{Result, SltError};
use crate::expression::Expression;
use crate::location_manager::LocationManager;
use crate::value::Scalar;

/// Shared handle to a single tree node.
pub type LocationRef = Rc<RefCell<Location>>;

/// Hint for how a force-override string should be coerced back to a
/// `Scalar`, standing in for the Python original's ROS field-type-name
/// sniffing (`startswith("int")`/`startswith("uint")`). Int-like fields
/// round the force string to the nearest integer via a float parse; every
/// other numeric field parses it directly as a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    IntLike,
    FloatLike,
}

/// A pending force override. Starts as the raw string a peer sent over
/// `SetValue`; the first `read` that actually needs a typed value coerces
/// and memoizes it in place, so repeat reads are idempotent and do not
/// re-parse.
#[derive(Debug, Clone)]
enum Force {
    Raw(String),
    Coerced(Scalar),
}

/// A node in a provenance tree. Fields follow the source's `Location`
/// one-for-one except `ref`, which the Python original uses as a back
/// pointer to the owning wrapper for attribute-read memoization — this
/// crate routes reads through the wrapper that already holds the
/// `LocationRef` instead, so no such field exists here.
#[derive(Debug, Clone)]
pub struct Location {
    pub node_name: String,
    pub id: i32,
    pub expr: Expression,
    pub content: Option<IndexMap<String, LocationRef>>,
    force: Option<Force>,
    /// The most recent value read through this location, cached so a
    /// remote `GetValue` request (routed through
    /// [`crate::location_manager::LocationManager::handle_get`]) has
    /// something to answer with even though the manager itself never sees
    /// the owning `Tracked`'s data directly.
    last_value: Option<Scalar>,
}

/// Two `Location`s are equal iff their `(node_name, id)` pair matches
/// (§3's Location invariant) — expression history, content, and force
/// state are deliberately not part of the comparison.
impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.node_name == other.node_name && self.id == other.id
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new(String::new(), -1)
    }
}

impl Location {
    #[must_use]
    pub fn new(node_name: String, id: i32) -> Self {
        Self { node_name, id, expr: Expression::new(), content: None, force: None, last_value: None }
    }

    #[must_use]
    pub fn new_ref(node_name: String, id: i32) -> LocationRef {
        Rc::new(RefCell::new(Self::new(node_name, id)))
    }

    /// `id >= 0` (registered with a manager) or the expression already
    /// carries history.
    #[must_use]
    pub fn has_state(&mut self) -> bool {
        self.id >= 0 || !self.expr.is_empty()
    }

    /// Shallow copy. `keep_id = false` produces an unregistered copy.
    /// Children are shared (same `LocationRef`s), not deep-cloned, matching
    /// the Python original's `dict(self.content)` shallow-copied mapping.
    #[must_use]
    pub fn copy(&self, keep_id: bool, keep_expr: bool, keep_content: bool) -> Self {
        Self {
            node_name: self.node_name.clone(),
            id: if keep_id { self.id } else { -1 },
            expr: if keep_expr { self.expr.clone() } else { Expression::new() },
            content: if keep_content { self.content.clone() } else { None },
            force: None,
            last_value: None,
        }
    }

    /// Deep copy: drops id and expression on every node, recursively
    /// deep-copying children into fresh, independently owned nodes.
    /// Mirrors the Python original's `__deepcopy__`.
    #[must_use]
    pub fn deep_copy(&self) -> LocationRef {
        let mut loc = self.copy(false, false, false);
        if let Some(content) = &self.content {
            for (name, item) in content {
                loc.content_add(name.clone(), item.borrow().deep_copy());
            }
        }
        Rc::new(RefCell::new(loc))
    }

    /// Clears this node's expression and recursively clears every child.
    pub fn clear(&mut self) {
        self.expr = Expression::new();
        if let Some(content) = &mut self.content {
            for item in content.values_mut() {
                item.borrow_mut().clear();
            }
        }
    }

    /// Structural overlay: for each child name present in `other`, replace
    /// (or create) the corresponding local child with a copy of `other`'s
    /// version, including its pending force override (`Location::copy`
    /// never carries `force`, so it is transplanted separately here).
    pub fn apply(&mut self, other: &Self) {
        let Some(other_content) = &other.content else { return };
        for (name, item) in other_content {
            let item = item.borrow();
            if self.content_has(name) {
                let existing = self.content_get(name).expect("just checked content_has");
                let mut copied = item.copy(true, true, true);
                copied.force.clone_from(&item.force);
                *existing.borrow_mut() = copied;
            } else {
                let mut loc = item.copy(false, false, false);
                loc.force.clone_from(&item.force);
                self.content_add(name.clone(), Rc::new(RefCell::new(loc)));
            }
        }
    }

    /// Registers this node (and recursively its children) with `mgr` if
    /// not already registered. `self_ref` must be the same handle this
    /// node is reachable through from its parent (or the tree root), so
    /// the manager's flat table aliases the live tree node.
    pub fn register(self_ref: &LocationRef, mgr: &mut LocationManager) {
        let mut needs_children_pass = false;
        {
            let mut this = self_ref.borrow_mut();
            if this.id < 0 {
                needs_children_pass = true;
            }
        }
        if needs_children_pass {
            let id = mgr.add_location(Rc::clone(self_ref));
            self_ref.borrow_mut().id = id;
        }
        let children: Vec<LocationRef> = self_ref.borrow().content.as_ref().map_or_else(Vec::new, |c| c.values().cloned().collect());
        for child in &children {
            Self::register(child, mgr);
        }
    }

    /// Applies a pending force override (if any) to a scalar leaf value,
    /// coercing and memoizing the override on first use.
    #[must_use]
    pub fn read_scalar(&mut self, value: Scalar, kind: NumericKind) -> Scalar {
        let result = match self.force.take() {
            None => value,
            Some(Force::Coerced(forced)) => {
                self.force = Some(Force::Coerced(forced.clone()));
                forced
            }
            Some(Force::Raw(raw)) => {
                let coerced = coerce_force(&raw, kind);
                self.force = Some(Force::Coerced(coerced.clone()));
                coerced
            }
        };
        self.last_value = Some(result.clone());
        result
    }

    /// The most recent value read through this node, if any — what
    /// [`crate::location_manager::LocationManager::handle_get`] answers a
    /// `GetValue` request with.
    #[must_use]
    pub fn current_value(&self) -> Option<&Scalar> {
        self.last_value.as_ref()
    }

    /// Sets a pending override, to be applied on the next `read_scalar`.
    pub fn set_force(&mut self, value: String) {
        self.force = Some(Force::Raw(value));
    }

    #[must_use]
    pub fn has_pending_force(&self) -> bool {
        self.force.is_some()
    }

    pub fn content_add(&mut self, name: String, location: LocationRef) {
        self.content.get_or_insert_with(IndexMap::new).insert(name, location);
    }

    pub fn content_remove(&mut self, name: &str) {
        if let Some(content) = &mut self.content {
            content.shift_remove(name);
        }
    }

    pub fn content_clear(&mut self) {
        if let Some(content) = &mut self.content {
            content.clear();
        }
    }

    #[must_use]
    pub fn content_has(&self, name: &str) -> bool {
        self.content.as_ref().is_some_and(|c| c.contains_key(name))
    }

    #[must_use]
    pub fn content_get(&self, name: &str) -> Option<LocationRef> {
        self.content.as_ref().and_then(|c| c.get(name)).cloned()
    }

    /// Returns the child at `name`, minting an empty unregistered one first
    /// if it doesn't exist yet.
    pub fn content_get_or_default(&mut self, name: &str) -> LocationRef {
        if !self.content_has(name) {
            self.content_add(name.to_owned(), Self::new_ref(String::new(), -1));
        }
        self.content_get(name).expect("just inserted")
    }

    fn header_write(self_ref: &LocationRef, header: &mut LocationHeaderMessage, parent: u32, name: &str) {
        let loc_index = header.locations.len() as u32;

        let node_name = self_ref.borrow().node_name.clone();
        let node_id = header.nodes.iter().position(|n| n == &node_name).map_or_else(
            || {
                header.nodes.push(node_name);
                (header.nodes.len() - 1) as u32
            },
            |idx| idx as u32,
        );

        let msg = self_ref.borrow_mut().to_message(node_id, name.to_owned());
        header.locations.push(msg);

        if loc_index != 0 {
            header.graph.push(parent);
            header.graph.push(loc_index);
        }

        let children: Vec<(String, LocationRef)> =
            self_ref.borrow().content.as_ref().map_or_else(Vec::new, |c| c.iter().map(|(n, l)| (n.clone(), Rc::clone(l))).collect());
        for (child_name, item) in children {
            Self::header_write(&item, header, loc_index, &child_name);
        }
    }

    /// Serializes this node's whole subtree into a flat
    /// [`LocationHeaderMessage`]. Only meaningful on a root `Location`.
    #[must_use]
    pub fn header_create(self_ref: &LocationRef) -> LocationHeaderMessage {
        let node_name = self_ref.borrow().node_name.clone();
        let mut header = LocationHeaderMessage { nodes: vec![node_name], locations: Vec::new(), graph: Vec::new() };
        Self::header_write(self_ref, &mut header, 0, "");
        header
    }

    #[must_use]
    pub fn to_message(&mut self, node_index: u32, name: String) -> LocationMessage {
        LocationMessage { id: self.id, node: node_index, name, expr: crate::codec::encode(&mut self.expr) }
    }

    /// # Errors
    /// Returns [`SltError::Schema`] if the wire expression fails to decode.
    pub fn from_message(msg: &LocationMessage, node_name: String) -> Result<Self> {
        Ok(Self { node_name, id: msg.id, expr: crate::codec::decode(&msg.expr)?, content: None, force: None, last_value: None })
    }

    /// Reconstructs a whole subtree from a flat [`LocationHeaderMessage`].
    ///
    /// # Errors
    /// Returns [`SltError::Schema`] if the header carries no locations at
    /// all, a graph edge points outside the decoded location list, a
    /// non-root location is named as the child of more than one edge, the
    /// root (index 0) is named as a child at all, or the edge list does not
    /// form a single tree reachable from the root (a disjoint island or a
    /// cycle among non-root indices) — §4.2's "valid forest rooted at index
    /// 0" invariant.
    pub fn from_header(msg: &LocationHeaderMessage) -> Result<LocationRef> {
        if msg.locations.is_empty() {
            return Err(SltError::Schema("location header carries no locations".to_owned()));
        }
        let len = msg.locations.len();

        let locations: Vec<LocationRef> = msg
            .locations
            .iter()
            .map(|loc| {
                let node_name = msg.nodes.get(loc.node as usize).cloned().unwrap_or_default();
                Self::from_message(loc, node_name).map(|l| Rc::new(RefCell::new(l)))
            })
            .collect::<Result<_>>()?;

        let mut parent_of: Vec<Option<usize>> = vec![None; len];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); len];
        for edge in msg.graph.chunks_exact(2) {
            let (parent, child) = (edge[0] as usize, edge[1] as usize);
            if parent >= len {
                return Err(SltError::Schema(format!("graph edge references missing location {parent}")));
            }
            if child >= len {
                return Err(SltError::Schema(format!("graph edge references missing location {child}")));
            }
            if parent_of[child].is_some() {
                return Err(SltError::Schema(format!("location {child} is the child of more than one edge")));
            }
            parent_of[child] = Some(parent);
            children[parent].push(child);
        }

        if parent_of[0].is_some() {
            return Err(SltError::Schema("root location (index 0) must not appear as a child".to_owned()));
        }

        let mut visited = vec![false; len];
        let mut stack = vec![0usize];
        visited[0] = true;
        let mut visited_count = 1;
        while let Some(node) = stack.pop() {
            for &child in &children[node] {
                if !visited[child] {
                    visited[child] = true;
                    visited_count += 1;
                    stack.push(child);
                }
            }
        }
        if visited_count != len {
            return Err(SltError::Schema("graph is not a single tree reachable from the root (disconnected or cyclic)".to_owned()));
        }

        for (child, parent) in parent_of.iter().enumerate().skip(1) {
            let parent = parent.expect("every non-root index has exactly one parent, checked above");
            let child_name = msg.locations[child].name.clone();
            locations[parent].borrow_mut().content_add(child_name, Rc::clone(&locations[child]));
        }

        Ok(Rc::clone(&locations[0]))
    }
}

fn coerce_force(raw: &str, kind: NumericKind) -> Scalar {
    match kind {
        NumericKind::IntLike => raw.parse::<f64>().map_or(Scalar::Int32(0), |v| Scalar::int_narrow(v.round() as i64)),
        NumericKind::FloatLike => raw.parse::<f64>().map_or(Scalar::Float(0.0), Scalar::Float),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_expr_message() -> crate::codec::ExpressionMessage {
        crate::codec::encode(&mut Expression::new())
    }

    #[test]
    fn equality_only_considers_node_name_and_id() {
        let mut a = Location::new("proc".to_owned(), 3);
        let mut b = Location::new("proc".to_owned(), 3);
        b.expr.append(Scalar::Int32(1), false, crate::operator::Operator::Add);
        assert_eq!(a, b);
        a.id = 4;
        assert_ne!(a, b);
    }

    #[test]
    fn has_state_tracks_id_and_expression() {
        let mut loc = Location::default();
        assert!(!loc.has_state());
        loc.id = 0;
        assert!(loc.has_state());
    }

    #[test]
    fn content_tree_round_trips_add_get_remove() {
        let mut root = Location::new("proc".to_owned(), 0);
        root.content_add("x".to_owned(), Location::new_ref("proc".to_owned(), 1));
        assert!(root.content_has("x"));
        assert!(root.content_get("x").is_some());
        root.content_remove("x");
        assert!(!root.content_has("x"));
    }

    #[test]
    fn force_override_coerces_and_memoizes_on_first_read() {
        let mut loc = Location::default();
        loc.set_force("11".to_owned());
        let first = loc.read_scalar(Scalar::Int32(0), NumericKind::IntLike);
        assert_eq!(first, Scalar::Int32(11));
        let second = loc.read_scalar(Scalar::Int32(0), NumericKind::IntLike);
        assert_eq!(second, Scalar::Int32(11));
    }

    #[test]
    fn apply_overlays_children_structurally() {
        let mut root = Location::new("proc".to_owned(), -1);
        let mut other = Location::new("proc".to_owned(), -1);
        other.content_add("x".to_owned(), Location::new_ref("proc".to_owned(), 7));
        root.apply(&other);
        assert!(root.content_has("x"));
        assert_eq!(root.content_get("x").unwrap().borrow().id, 7);
    }

    #[test]
    fn header_round_trips_a_small_tree() {
        let root = Location::new_ref("proc".to_owned(), 0);
        root.borrow_mut().content_add("x".to_owned(), Location::new_ref("proc".to_owned(), 1));
        root.borrow_mut().content_add("y".to_owned(), Location::new_ref("proc".to_owned(), 2));

        let header = Location::header_create(&root);
        assert_eq!(header.locations.len(), 3);

        let rebuilt = Location::from_header(&header).unwrap();
        assert!(rebuilt.borrow().content_has("x"));
        assert!(rebuilt.borrow().content_has("y"));
    }

    #[test]
    fn deep_copy_drops_ids_and_expressions_recursively() {
        let mut root = Location::new("proc".to_owned(), 4);
        root.content_add("x".to_owned(), Location::new_ref("proc".to_owned(), 5));
        let copy = root.deep_copy();
        assert_eq!(copy.borrow().id, -1);
        assert_eq!(copy.borrow().content_get("x").unwrap().borrow().id, -1);
    }

    #[test]
    fn from_header_rejects_a_node_named_as_the_child_of_two_edges() {
        let header = LocationHeaderMessage {
            nodes: vec!["proc".to_owned()],
            locations: vec![
                LocationMessage { id: 0, node: 0, name: String::new(), expr: empty_expr_message() },
                LocationMessage { id: 1, node: 0, name: "a".to_owned(), expr: empty_expr_message() },
                LocationMessage { id: 2, node: 0, name: "b".to_owned(), expr: empty_expr_message() },
            ],
            graph: vec![0, 1, 2, 1],
        };
        assert!(matches!(Location::from_header(&header), Err(SltError::Schema(_))));
    }

    #[test]
    fn from_header_rejects_a_cycle_disconnected_from_the_root() {
        let header = LocationHeaderMessage {
            nodes: vec!["proc".to_owned()],
            locations: vec![
                LocationMessage { id: 0, node: 0, name: String::new(), expr: empty_expr_message() },
                LocationMessage { id: 1, node: 0, name: "a".to_owned(), expr: empty_expr_message() },
                LocationMessage { id: 2, node: 0, name: "b".to_owned(), expr: empty_expr_message() },
            ],
            // 1 and 2 point at each other; neither is reachable from root 0.
            graph: vec![2, 1, 1, 2],
        };
        assert!(matches!(Location::from_header(&header), Err(SltError::Schema(_))));
    }

    #[test]
    fn from_header_rejects_the_root_appearing_as_a_child() {
        let header = LocationHeaderMessage {
            nodes: vec!["proc".to_owned()],
            locations: vec![
                LocationMessage { id: 0, node: 0, name: String::new(), expr: empty_expr_message() },
                LocationMessage { id: 1, node: 0, name: "a".to_owned(), expr: empty_expr_message() },
            ],
            graph: vec![1, 0],
        };
        assert!(matches!(Location::from_header(&header), Err(SltError::Schema(_))));
    }

    #[test]
    fn register_shares_the_same_node_the_manager_sees() {
        let mut mgr = LocationManager::new("proc".to_owned());
        let root = Location::new_ref("proc".to_owned(), -1);
        Location::register(&root, &mut mgr);
        assert!(root.borrow().id >= 0);
        let id = root.borrow().id;
        root.borrow_mut().set_force("5".to_owned());
        assert!(mgr.location(id).unwrap().borrow().has_pending_force());
    }
}
