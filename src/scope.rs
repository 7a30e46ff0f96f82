//! RAII scopes over the process-wide registry.
//!
//! Each thread keeps a stack of the scopes it currently has open. Entering a
//! scope resolves its name under the innermost open scope (or the global
//! root when the stack is empty), starts the node, and pushes it. Dropping
//! the returned guard stops the node and pops it, on every exit path
//! including unwinding.
//!
//! The stack is thread-local. A scope entered on a freshly spawned worker
//! does not see the spawning thread's scopes and lands under the global
//! root. To nest worker time under a specific scope, resolve the node with
//! an explicit parent and drive `start`/`stop` directly.

use std::cell::RefCell;

use crate::config::ReportOptions;
use crate::node::NodeRef;
use crate::registry::{NodeId, Parent};

thread_local! {
    static STACK: RefCell<Vec<NodeId>> = const { RefCell::new(Vec::new()) };
}

type Printer = Box<dyn FnOnce(&str)>;

/// Options for entering a scope.
pub struct ScopeBuilder {
    name: String,
    flush: bool,
    printer: Option<Printer>,
    options: ReportOptions,
}

impl ScopeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flush: false,
            printer: None,
            options: ReportOptions::default(),
        }
    }

    /// Empty the node and destroy its subtree before entering.
    pub fn flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    /// Hand the scope's report (header included) to `printer` when the
    /// scope exits.
    pub fn report_printer(mut self, printer: impl FnOnce(&str) + 'static) -> Self {
        self.printer = Some(Box::new(printer));
        self
    }

    /// Filters for the report passed to the printer.
    pub fn report_options(mut self, options: ReportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn enter(self) -> ScopeGuard {
        let parent = current().map_or(Parent::Global, Parent::from);
        let node = crate::registry().resolve(&self.name, parent, self.flush);
        let depth = STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(node.id());
            stack.len() - 1
        });
        node.start();
        ScopeGuard {
            node: node.id(),
            depth,
            printer: self.printer,
            options: self.options,
        }
    }
}

/// An open scope. Stops the node and leaves the scope when dropped.
///
/// Not `Send`: timing is keyed by thread, so the guard must be dropped on
/// the thread that created it.
#[must_use = "dropping the guard immediately closes the scope; bind it with `let _scope = ...`"]
pub struct ScopeGuard {
    node: NodeId,
    depth: usize,
    printer: Option<Printer>,
    options: ReportOptions,
}

impl ScopeGuard {
    pub fn node(&self) -> NodeRef<'static> {
        crate::registry().node(self.node)
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let node = self.node();
        node.stop();
        // Truncate rather than pop so guards dropped out of order still
        // leave the stack consistent.
        let _ = STACK.try_with(|stack| stack.borrow_mut().truncate(self.depth));
        if let Some(printer) = self.printer.take() {
            printer(&node.report(self.options));
        }
    }
}

/// Enter the scope `name` under the innermost open scope on this thread.
pub fn scope(name: impl Into<String>) -> ScopeGuard {
    ScopeBuilder::new(name).enter()
}

/// Builder for a scope with options.
pub fn scope_builder(name: impl Into<String>) -> ScopeBuilder {
    ScopeBuilder::new(name)
}

/// Run `f` inside the scope `name` and return its result.
pub fn profiled<R>(name: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let _scope = scope(name);
    f()
}

/// Innermost open scope on this thread.
pub fn current() -> Option<NodeRef<'static>> {
    STACK
        .try_with(|stack| stack.borrow().last().copied())
        .ok()
        .flatten()
        .map(|id| crate::registry().node(id))
}

/// Number of scopes open on this thread.
pub fn depth() -> usize {
    STACK.try_with(|stack| stack.borrow().len()).unwrap_or(0)
}
