//! Point-in-time export of a scope tree.
//!
//! A `NodeSnapshot` copies the statistics of a node and its subtree into
//! plain data that can be serialized. Nothing is ever read back into a
//! registry; snapshots are for offline inspection only.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::registry::{Arena, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub full_path: String,
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub standard_deviation: f64,
    pub min: f64,
    pub max: f64,
    /// Sorted by name.
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub(crate) fn capture(arena: &Arena, id: NodeId) -> Option<Self> {
        let node = arena.node(id)?;
        let (count, total, mean, standard_deviation, min, max) = node.with_stats(|s| {
            (s.count, s.total, s.mean, s.standard_deviation, s.min, s.max)
        });
        let children = arena
            .sorted_children(id)
            .into_iter()
            .filter_map(|child| Self::capture(arena, child))
            .collect();
        Some(Self {
            name: node.name.clone(),
            full_path: node.full_path.clone(),
            count,
            total,
            mean,
            standard_deviation,
            min,
            max,
            children,
        })
    }

    /// Depth-first search for the node at `full_path`.
    pub fn find(&self, full_path: &str) -> Option<&NodeSnapshot> {
        if self.full_path == full_path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(full_path))
    }
}

/// Write `snapshot` as pretty-printed JSON, creating parent directories.
pub fn write_snapshot(snapshot: &NodeSnapshot, path: &Path) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
    };
    write().map_err(|source| Error::SnapshotWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `snapshot` into `dir` as `<unix-millis>.json` and return the path.
pub fn write_snapshot_to_dir(snapshot: &NodeSnapshot, dir: &Path) -> Result<PathBuf, Error> {
    let path = dir.join(format!("{}.json", timestamp_ms()));
    write_snapshot(snapshot, &path)?;
    Ok(path)
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
