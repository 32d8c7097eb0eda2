//! Concurrent handle registry
//!
//! This module tracks every live handle the intercepted API has handed to
//! the application. Each handle is keyed by its raw value plus its
//! object-type tag, owns an optional per-object custom state, and sits in
//! a parent/child graph mirroring the API's object hierarchy.
//!
//! Parent/child edges are stored as [`HandleKey`] values and re-resolved
//! through the registry map on every traversal, never as cached
//! references, so a node destroyed on another thread can never be
//! dereferenced mid-traversal; resolution simply fails and the entry is
//! skipped.
//!
//! Locking: one process-wide mutex guards the map itself; each node
//! separately guards only its own children list. Recursive destruction
//! holds the map lock for the whole operation and takes a node's children
//! lock only while reading that node's list, so the two levels are never
//! acquired in conflicting order across threads.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::actions::{ActionSetTracker, ActionTracker};
use crate::api::ObjectType;
use crate::session::SessionTracker;
use crate::swapchain::SwapchainTracker;

/// Registry key: raw handle value plus object-type tag. At most one live
/// node exists per key at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleKey {
    pub raw: u64,
    pub object_type: ObjectType,
}

impl HandleKey {
    pub fn new(raw: u64, object_type: ObjectType) -> Self {
        Self { raw, object_type }
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}", self.object_type, self.raw)
    }
}

/// Typed failure kinds for registry operations.
///
/// `UnknownHandle` is a reportable condition: the application passed a
/// handle the registry never saw (or already destroyed), and the boundary
/// translates it into the API's invalid-handle result. `DuplicateHandle`
/// means two creations resolved to the same key: the registry's own
/// invariant is broken and the validator process must abort rather than
/// attribute the bug to the implementation under test.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no live handle registered for {0}")]
    UnknownHandle(HandleKey),
    #[error("handle {0} is already registered")]
    DuplicateHandle(HandleKey),
}

/// Per-object custom state, selected by the owning node's object-type tag.
///
/// Instances and spaces carry no custom state; the other object kinds each
/// get the tracker implementing their state machine.
pub enum CustomState {
    Session(SessionTracker),
    Swapchain(SwapchainTracker),
    ActionSet(ActionSetTracker),
    Action(ActionTracker),
}

/// One live handle. Owns its custom state exclusively; parent and child
/// links are non-owning keys used only for traversal.
pub struct HandleNode {
    key: HandleKey,
    parent: Option<HandleKey>,
    children: Mutex<Vec<HandleKey>>,
    state: OnceLock<CustomState>,
}

impl fmt::Debug for HandleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleNode")
            .field("key", &self.key)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl HandleNode {
    /// Build a top-level node (an instance); everything else is created
    /// through [`HandleRegistry::child_node`].
    pub fn root(raw: u64, object_type: ObjectType) -> Arc<Self> {
        Arc::new(Self {
            key: HandleKey::new(raw, object_type),
            parent: None,
            children: Mutex::new(Vec::new()),
            state: OnceLock::new(),
        })
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn parent(&self) -> Option<HandleKey> {
        self.parent
    }

    /// Attach the type-specific custom state. Called exactly once by the
    /// creation hook right after the node is registered; a second attach
    /// indicates a validator bug.
    pub fn attach_state(&self, state: CustomState) -> Result<(), CustomState> {
        self.state.set(state)
    }

    pub fn state(&self) -> Option<&CustomState> {
        self.state.get()
    }

    pub fn session(&self) -> Option<&SessionTracker> {
        match self.state.get() {
            Some(CustomState::Session(s)) => Some(s),
            _ => None,
        }
    }

    pub fn swapchain(&self) -> Option<&SwapchainTracker> {
        match self.state.get() {
            Some(CustomState::Swapchain(s)) => Some(s),
            _ => None,
        }
    }

    pub fn action_set(&self) -> Option<&ActionSetTracker> {
        match self.state.get() {
            Some(CustomState::ActionSet(s)) => Some(s),
            _ => None,
        }
    }

    pub fn action(&self) -> Option<&ActionTracker> {
        match self.state.get() {
            Some(CustomState::Action(a)) => Some(a),
            _ => None,
        }
    }

    /// Snapshot of the node's direct children.
    pub fn child_keys(&self) -> Vec<HandleKey> {
        self.children.lock().clone()
    }
}

/// The process-wide handle tracker.
pub struct HandleRegistry {
    map: Mutex<HashMap<HandleKey, Arc<HandleNode>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a node built by [`HandleNode::root`] or
    /// [`HandleRegistry::child_node`]. Fails with `DuplicateHandle` if the
    /// key is already live.
    pub fn register(&self, node: Arc<HandleNode>) -> Result<(), RegistryError> {
        let mut map = self.map.lock();
        if map.contains_key(&node.key) {
            return Err(RegistryError::DuplicateHandle(node.key));
        }
        debug!("registering {}", node.key);
        map.insert(node.key, node);
        Ok(())
    }

    /// Resolve a key to its live node.
    pub fn lookup(&self, key: HandleKey) -> Result<Arc<HandleNode>, RegistryError> {
        self.map
            .lock()
            .get(&key)
            .cloned()
            .ok_or(RegistryError::UnknownHandle(key))
    }

    /// Remove a node and, depth-first, every descendant before it. The
    /// node is also detached from its parent's children list if the parent
    /// is still live.
    pub fn unregister(&self, key: HandleKey) -> Result<(), RegistryError> {
        let mut map = self.map.lock();
        let node = map
            .get(&key)
            .cloned()
            .ok_or(RegistryError::UnknownHandle(key))?;

        Self::remove_subtree(&mut map, &node);

        if let Some(parent_key) = node.parent {
            if let Some(parent) = map.get(&parent_key) {
                parent.children.lock().retain(|k| *k != key);
            }
        }
        Ok(())
    }

    fn remove_subtree(map: &mut HashMap<HandleKey, Arc<HandleNode>>, node: &Arc<HandleNode>) {
        // Snapshot the list so the children lock is not held across the
        // recursion.
        let children = node.child_keys();
        for child_key in children {
            if let Some(child) = map.get(&child_key).cloned() {
                Self::remove_subtree(map, &child);
            }
        }
        debug!("unregistering {}", node.key);
        map.remove(&node.key);
    }

    /// Build a child node under `parent`. The child's key is appended to
    /// the parent's children list here, but the node itself is returned
    /// unregistered; the creation hook registers it once the forwarded
    /// call has succeeded.
    pub fn child_node(
        &self,
        parent: &HandleNode,
        raw: u64,
        object_type: ObjectType,
    ) -> Arc<HandleNode> {
        let key = HandleKey::new(raw, object_type);
        let node = Arc::new(HandleNode {
            key,
            parent: Some(parent.key),
            children: Mutex::new(Vec::new()),
            state: OnceLock::new(),
        });
        parent.children.lock().push(key);
        node
    }

    /// Resolve the live children of `key` with the given type tag. Entries
    /// whose nodes were concurrently destroyed fail resolution and are
    /// skipped.
    pub fn children_of(&self, key: HandleKey, object_type: ObjectType) -> Vec<Arc<HandleNode>> {
        let map = self.map.lock();
        let Some(node) = map.get(&key) else {
            return Vec::new();
        };
        node.child_keys()
            .into_iter()
            .filter(|k| k.object_type == object_type)
            .filter_map(|k| map.get(&k).cloned())
            .collect()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
