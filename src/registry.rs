//! Path-keyed node registry.
//!
//! The registry owns every node in an arena of slots and indexes them by full
//! path. Slots vacated by a flush are reused; every node gets a fresh
//! generation, so a handle to a destroyed node never reaches its successor.
//! `resolve` is the only way nodes come into existence and is idempotent per
//! path, which is what turns repeated entries into the same scope into one
//! aggregated node.
//!
//! Locking: the arena structure sits behind an `RwLock`. Timing operations,
//! accessors and reports take the read lock and then the touched node's own
//! mutex, one node at a time, always child before parent. Creating, flushing
//! and resetting take the write lock.

use std::collections::HashMap;
use std::thread;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::config::ReportOptions;
use crate::error::Error;
use crate::node::{Node, NodeRef};

/// Slot index plus the generation of the node created in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

/// Where a resolved node hangs in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parent {
    /// Under the registry's global root: path `"/" + name`.
    #[default]
    Global,
    /// A tree of its own, outside the global root: path `name`.
    Explicit,
    /// Under an already resolved node.
    Node(NodeId),
}

impl From<NodeId> for Parent {
    fn from(id: NodeId) -> Self {
        Parent::Node(id)
    }
}

impl From<NodeRef<'_>> for Parent {
    fn from(node: NodeRef<'_>) -> Self {
        Parent::Node(node.id())
    }
}

impl From<Option<NodeRef<'_>>> for Parent {
    fn from(node: Option<NodeRef<'_>>) -> Self {
        node.map_or(Parent::Global, Parent::from)
    }
}

struct Slot {
    generation: u64,
    node: Option<Node>,
}

pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_path: HashMap<String, NodeId>,
    root: NodeId,
    /// Generations keep counting across resets.
    next_generation: u64,
}

impl Arena {
    fn new(first_generation: u64) -> Self {
        let mut arena = Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_path: HashMap::new(),
            root: NodeId {
                index: 0,
                generation: first_generation,
            },
            next_generation: first_generation,
        };
        arena.root = arena.insert("", String::new(), None);
        arena
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    fn lookup(&self, full_path: &str) -> Option<NodeId> {
        self.by_path.get(full_path).copied()
    }

    /// Compute the full path a `(name, parent)` pair resolves to, and the
    /// parent slot it attaches to.
    fn placement(&self, name: &str, parent: Parent) -> (String, Option<NodeId>) {
        let parent_id = match parent {
            Parent::Explicit => return (name.to_owned(), None),
            Parent::Global => self.root,
            Parent::Node(id) if self.node(id).is_some() => id,
            Parent::Node(id) => {
                tracing::warn!(?id, name, "parent scope no longer exists; using the global root");
                self.root
            }
        };
        let parent_path = self.node(parent_id).map_or("", |p| p.full_path.as_str());
        (format!("{parent_path}/{name}"), Some(parent_id))
    }

    fn insert(&mut self, name: &str, full_path: String, parent: Option<NodeId>) -> NodeId {
        let generation = self.next_generation;
        self.next_generation += 1;
        let node = Some(Node::new(name.to_owned(), full_path.clone(), parent));
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Slot { generation, node };
                index
            }
            None => {
                self.slots.push(Slot { generation, node });
                self.slots.len() - 1
            }
        };
        let id = NodeId { index, generation };

        tracing::debug!(path = %full_path, "registering scope");
        self.by_path.insert(full_path, id);
        if let Some(parent) = parent.and_then(|p| self.node_mut(p)) {
            parent.children.push(id);
        }
        id
    }

    /// Destroy every descendant of `id`, dropping them from the path index
    /// and returning their slots to the free list.
    fn remove_descendants(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            self.remove_descendants(child);
            let Some(slot) = self
                .slots
                .get_mut(child.index)
                .filter(|slot| slot.generation == child.generation)
            else {
                continue;
            };
            if let Some(node) = slot.node.take() {
                self.by_path.remove(&node.full_path);
                self.free.push(child.index);
            }
        }
    }

    /// Replace `id` with an empty node at the same path, discarding its
    /// samples, in-flight entries and entire subtree. The node keeps its id.
    fn flush(&mut self, id: NodeId) {
        self.remove_descendants(id);
        let Some(slot) = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        if let Some(old) = slot.node.take() {
            tracing::debug!(path = %old.full_path, "flushing scope");
            slot.node = Some(Node::new(old.name, old.full_path, old.parent));
        }
    }

    pub(crate) fn start(&self, id: NodeId) {
        match self.node(id) {
            Some(node) => node.start(thread::current().id()),
            None => tracing::debug!(?id, "start on a destroyed scope; ignoring"),
        }
    }

    pub(crate) fn stop(&self, id: NodeId) {
        let Some(node) = self.node(id) else {
            tracing::debug!(?id, "stop on a destroyed scope; ignoring");
            return;
        };
        match node.stop(thread::current().id()) {
            Some(elapsed) => self.backfill(node.parent, elapsed),
            None => tracing::warn!(
                path = %node.full_path,
                "stop without a matching start on this thread; ignoring"
            ),
        }
    }

    pub(crate) fn record(&self, id: NodeId, elapsed: f64) {
        if !elapsed.is_finite() || elapsed < 0.0 {
            tracing::warn!(elapsed, "ignoring sample that is negative or not finite");
            return;
        }
        let Some(node) = self.node(id) else {
            tracing::debug!(?id, "sample for a destroyed scope; ignoring");
            return;
        };
        node.append(elapsed);
        self.backfill(node.parent, elapsed);
    }

    /// Attribute `elapsed` to each ancestor, starting at `from`, until one is
    /// running on some thread.
    fn backfill(&self, from: Option<NodeId>, elapsed: f64) {
        let mut cursor = from;
        while let Some(node) = cursor.and_then(|id| self.node(id)) {
            if !node.append_if_idle(elapsed) {
                break;
            }
            cursor = node.parent;
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let mut children: Vec<(&str, NodeId)> = node
            .children
            .iter()
            .filter_map(|&c| self.node(c).map(|n| (n.name.as_str(), c)))
            .collect();
        children.sort_unstable();
        children.into_iter().map(|(_, id)| id).collect()
    }

    /// Longest full path, in chars, among `id` and all of its descendants.
    pub(crate) fn path_width(&self, id: NodeId) -> usize {
        let Some(node) = self.node(id) else {
            return 0;
        };
        node.children
            .iter()
            .map(|&c| self.path_width(c))
            .fold(node.full_path.chars().count(), usize::max)
    }
}

/// Process-local store of every scope node.
pub struct Registry {
    arena: RwLock<Arena>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry holding only an empty global root.
    pub fn new() -> Self {
        Self {
            arena: RwLock::new(Arena::new(0)),
        }
    }

    pub(crate) fn arena(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read()
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef::new(self, self.arena().root())
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef::new(self, id)
    }

    /// Find or create the node for `name` under `parent`.
    ///
    /// An existing node is returned as is, keeping its samples. With `flush`
    /// set, an existing node is emptied and its whole subtree destroyed first;
    /// handles into that subtree go stale.
    pub fn resolve(&self, name: &str, parent: impl Into<Parent>, flush: bool) -> NodeRef<'_> {
        let parent = parent.into();
        if !flush {
            let arena = self.arena.read();
            let (path, _) = arena.placement(name, parent);
            if let Some(id) = arena.lookup(&path) {
                return NodeRef::new(self, id);
            }
        }

        let mut arena = self.arena.write();
        let (path, parent_id) = arena.placement(name, parent);
        let id = match arena.lookup(&path) {
            Some(id) => {
                if flush {
                    arena.flush(id);
                }
                id
            }
            None => arena.insert(name, path, parent_id),
        };
        NodeRef::new(self, id)
    }

    pub fn get(&self, full_path: &str) -> Result<NodeRef<'_>, Error> {
        self.arena()
            .lookup(full_path)
            .map(|id| NodeRef::new(self, id))
            .ok_or_else(|| Error::NotFound {
                path: full_path.to_owned(),
            })
    }

    /// Drop every node and start over with an empty global root.
    ///
    /// Must not be called while any scope is running. Existing handles go
    /// stale; they never reach nodes created after the reset.
    pub fn reset(&self) {
        tracing::debug!("resetting scope registry");
        let mut arena = self.arena.write();
        let next_generation = arena.next_generation;
        *arena = Arena::new(next_generation);
    }

    /// Number of live nodes, the global root included.
    pub fn node_count(&self) -> usize {
        self.arena().by_path.len()
    }

    /// Column titles sized for the global root's tree.
    pub fn header(&self) -> String {
        let arena = self.arena();
        crate::report::header(arena.path_width(arena.root()))
    }

    /// Header plus the global root's tree.
    pub fn report(&self, options: ReportOptions) -> String {
        self.root().report(options)
    }
}
