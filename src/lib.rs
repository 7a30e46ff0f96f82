//! Hierarchical call-tree timing profiler.
//!
//! Code marks named scopes; every invocation's wall-clock time is recorded
//! on the node for that scope's position in the tree, and invocations of the
//! same path aggregate into one set of statistics. A report renders the tree
//! as an ASCII table with share-of-total and share-of-parent columns.
//!
//! ```no_run
//! let _outer = calltree::scope("load");
//! calltree::profiled("parse", || {
//!     // ... work ...
//! });
//! drop(_outer);
//! print!("{}", calltree::report(calltree::ReportOptions::from_env()));
//! ```
//!
//! The free functions operate on one process-wide [`Registry`]. Independent
//! registries can be created with [`Registry::new`] and driven through
//! [`Registry::resolve`] and [`NodeRef`].

mod config;
pub mod error;
mod node;
mod registry;
mod report;
mod scope;
mod snapshot;
mod stats;

use std::path::PathBuf;
use std::sync::OnceLock;

pub use config::{
    snapshot_dir, ReportOptions, MIN_PARENT_PERCENT_ENV, MIN_TOTAL_PERCENT_ENV, RUNS_DIR_ENV,
};
pub use error::Error;
pub use node::NodeRef;
pub use registry::{NodeId, Parent, Registry};
pub use report::header as header_with_width;
pub use scope::{current, depth, profiled, scope, scope_builder, ScopeBuilder, ScopeGuard};
pub use snapshot::{write_snapshot, write_snapshot_to_dir, NodeSnapshot};
pub use stats::Stats;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Find or create a scope node in the process-wide registry.
pub fn resolve(name: &str, parent: impl Into<Parent>, flush: bool) -> NodeRef<'static> {
    registry().resolve(name, parent, flush)
}

/// Look up a scope by full path.
pub fn get(full_path: &str) -> Result<NodeRef<'static>, Error> {
    registry().get(full_path)
}

/// Clear the process-wide registry. No scope may be running.
pub fn reset() {
    registry().reset();
}

/// Header plus every row of the process-wide tree that passes `options`.
pub fn report(options: ReportOptions) -> String {
    registry().report(options)
}

/// Column titles sized for the process-wide tree.
pub fn header() -> String {
    registry().header()
}

/// Save a snapshot of the process-wide tree into `CALLTREE_RUNS_DIR`.
///
/// Returns `Ok(None)` when the variable is not set.
pub fn save_snapshot() -> Result<Option<PathBuf>, Error> {
    let Some(dir) = snapshot_dir() else {
        return Ok(None);
    };
    let Some(snapshot) = registry().root().snapshot() else {
        return Ok(None);
    };
    write_snapshot_to_dir(&snapshot, &dir).map(Some)
}
