//! Timing nodes and the handles callers use to drive them.
//!
//! A `Node` is one position in the scope hierarchy. The registry arena owns
//! every node; parent and child links are plain `NodeId` slot handles. Each node
//! keeps its mutable timing state (samples, per-thread start timestamps and
//! the statistics cache) behind its own lock, so threads timing different
//! scopes never contend.

use std::collections::HashMap;
use std::fmt;
use std::thread::ThreadId;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::ReportOptions;
use crate::registry::{NodeId, Registry};
use crate::snapshot::NodeSnapshot;
use crate::stats::Stats;

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) full_path: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    timing: Mutex<Timing>,
}

#[derive(Default)]
struct Timing {
    samples: Vec<f64>,
    in_flight: HashMap<ThreadId, Instant>,
    cache: Option<Stats>,
}

impl Timing {
    fn push(&mut self, elapsed: f64) {
        self.samples.push(elapsed);
        self.cache = None;
    }

    fn stats(&mut self) -> &Stats {
        let samples = &self.samples;
        self.cache.get_or_insert_with(|| Stats::from_samples(samples))
    }
}

impl Node {
    pub(crate) fn new(name: String, full_path: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            full_path,
            parent,
            children: Vec::new(),
            timing: Mutex::new(Timing::default()),
        }
    }

    /// Mark the node running on `thread`. Overwrites an earlier start on the
    /// same thread that was never stopped.
    pub(crate) fn start(&self, thread: ThreadId) {
        self.timing.lock().in_flight.insert(thread, Instant::now());
    }

    /// Close the interval opened by `start` on `thread` and append it as a
    /// sample. Returns the elapsed seconds, or `None` for an unmatched stop.
    pub(crate) fn stop(&self, thread: ThreadId) -> Option<f64> {
        let mut timing = self.timing.lock();
        let started = timing.in_flight.remove(&thread)?;
        let elapsed = started.elapsed().as_secs_f64();
        timing.push(elapsed);
        Some(elapsed)
    }

    pub(crate) fn append(&self, elapsed: f64) {
        self.timing.lock().push(elapsed);
    }

    /// Append `elapsed` only if no thread currently has this node running.
    /// Check and append happen under one lock acquisition.
    pub(crate) fn append_if_idle(&self, elapsed: f64) -> bool {
        let mut timing = self.timing.lock();
        if !timing.in_flight.is_empty() {
            return false;
        }
        timing.push(elapsed);
        true
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.timing.lock().in_flight.is_empty()
    }

    pub(crate) fn with_stats<R>(&self, f: impl FnOnce(&Stats) -> R) -> R {
        f(self.timing.lock().stats())
    }
}

/// Handle to a node in a [`Registry`].
///
/// Handles are cheap to copy. They stay valid until the node is destroyed:
/// flushing an ancestor destroys it, and so does [`Registry::reset`]. After
/// that, mutators on the handle do nothing and accessors read as zero, even
/// once the slot holds a new node.
#[derive(Clone, Copy)]
pub struct NodeRef<'r> {
    registry: &'r Registry,
    id: NodeId,
}

impl<'r> NodeRef<'r> {
    pub(crate) fn new(registry: &'r Registry, id: NodeId) -> Self {
        Self { registry, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn name(&self) -> String {
        self.read(|node| node.name.clone()).unwrap_or_default()
    }

    pub fn full_path(&self) -> String {
        self.read(|node| node.full_path.clone()).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<NodeRef<'r>> {
        self.read(|node| node.parent)
            .flatten()
            .map(|id| NodeRef::new(self.registry, id))
    }

    /// Children in ascending name order.
    pub fn children(&self) -> Vec<NodeRef<'r>> {
        self.registry
            .arena()
            .sorted_children(self.id)
            .into_iter()
            .map(|id| NodeRef::new(self.registry, id))
            .collect()
    }

    /// Begin an invocation on the calling thread.
    pub fn start(&self) {
        self.registry.arena().start(self.id);
    }

    /// End the calling thread's invocation and record its elapsed time.
    ///
    /// A stop with no matching start on this thread is logged and ignored.
    ///
    /// The sample is also back-filled into every idle ancestor, walking up
    /// until an ancestor that is running on any thread. This keeps a
    /// parent's total covering its children even when the child ran on a
    /// thread that never entered the parent. The back-filled time is
    /// attributed, not measured: it lands as an extra sample next to the
    /// ancestor's own measured ones, so under heavy concurrency an
    /// ancestor's total can exceed the wall-clock time it covers.
    pub fn stop(&self) {
        self.registry.arena().stop(self.id);
    }

    /// Append an externally measured sample, with the same ancestor
    /// back-fill as [`stop`](Self::stop).
    pub fn record(&self, elapsed_secs: f64) {
        self.registry.arena().record(self.id, elapsed_secs);
    }

    /// Whether any thread currently has this node started.
    pub fn is_running(&self) -> bool {
        self.read(Node::is_running).unwrap_or(false)
    }

    pub fn stats(&self) -> Stats {
        self.stat(Stats::clone)
    }

    pub fn count(&self) -> usize {
        self.stat(|s| s.count)
    }

    pub fn total(&self) -> f64 {
        self.stat(|s| s.total)
    }

    pub fn mean(&self) -> f64 {
        self.stat(|s| s.mean)
    }

    pub fn standard_deviation(&self) -> f64 {
        self.stat(|s| s.standard_deviation)
    }

    pub fn min(&self) -> f64 {
        self.stat(|s| s.min)
    }

    pub fn max(&self) -> f64 {
        self.stat(|s| s.max)
    }

    /// Nearest-rank percentile of the samples, `percentile` in `0..=100`.
    pub fn tail(&self, percentile: f64) -> f64 {
        self.stat(|s| s.tail(percentile))
    }

    /// Table rows for this node and its subtree, without the header.
    pub fn render(&self, options: ReportOptions) -> String {
        crate::report::render(&self.registry.arena(), self.id, &options)
    }

    /// Header followed by [`render`](Self::render).
    pub fn report(&self, options: ReportOptions) -> String {
        let arena = self.registry.arena();
        let mut out = crate::report::header(arena.path_width(self.id));
        out.push_str(&crate::report::render(&arena, self.id, &options));
        out
    }

    /// Length, in chars, of the longest full path in this node's subtree.
    pub fn path_width(&self) -> usize {
        self.registry.arena().path_width(self.id)
    }

    pub fn snapshot(&self) -> Option<NodeSnapshot> {
        NodeSnapshot::capture(&self.registry.arena(), self.id)
    }

    fn read<R>(&self, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.registry.arena().node(self.id).map(f)
    }

    fn stat<R: Default>(&self, f: impl FnOnce(&Stats) -> R) -> R {
        self.read(|node| node.with_stats(f)).unwrap_or_default()
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.registry, other.registry) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl std::hash::Hash for NodeRef<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("full_path", &self.full_path())
            .finish()
    }
}

impl fmt::Display for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(ReportOptions::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn current() -> ThreadId {
        thread::current().id()
    }

    #[test]
    fn stop_without_start_is_ignored() {
        let node = Node::new("p1".into(), "/p1".into(), None);
        assert_eq!(node.stop(current()), None);
        assert_eq!(node.with_stats(|s| s.count), 0);
    }

    #[test]
    fn start_stop_appends_one_sample() {
        let node = Node::new("p1".into(), "/p1".into(), None);
        node.start(current());
        assert!(node.is_running());
        thread::sleep(Duration::from_millis(2));
        let elapsed = node.stop(current()).expect("matched stop");
        assert!(elapsed >= 0.002, "elapsed was {elapsed}");
        assert!(!node.is_running());
        assert_eq!(node.with_stats(|s| s.count), 1);
        assert_eq!(node.with_stats(|s| s.total), elapsed);
    }

    #[test]
    fn cache_is_invalidated_by_new_samples() {
        let node = Node::new("p1".into(), "/p1".into(), None);
        node.append(1.0);
        assert_eq!(node.with_stats(|s| s.total), 1.0);
        node.append(2.0);
        assert_eq!(node.with_stats(|s| s.total), 3.0);
        assert_eq!(node.with_stats(|s| s.max), 2.0);
    }

    #[test]
    fn append_if_idle_refuses_running_nodes() {
        let node = Node::new("p1".into(), "/p1".into(), None);
        node.start(current());
        assert!(!node.append_if_idle(1.0));
        node.stop(current());
        assert!(node.append_if_idle(1.0));
        assert_eq!(node.with_stats(|s| s.count), 2);
    }

    #[test]
    fn starts_on_different_threads_are_independent() {
        let node = Node::new("p1".into(), "/p1".into(), None);
        node.start(current());
        thread::scope(|s| {
            s.spawn(|| {
                let me = thread::current().id();
                node.start(me);
                assert!(node.stop(me).is_some());
                // The main thread's entry is untouched.
                assert!(node.stop(me).is_none());
            });
        });
        assert!(node.is_running());
        assert!(node.stop(current()).is_some());
        assert_eq!(node.with_stats(|s| s.count), 2);
    }
}
