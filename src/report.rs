//! ASCII table rendering of a scope tree.
//!
//! Rows are emitted depth-first with children in ascending name order, so
//! two renders of the same tree are byte-identical. The path column is as
//! wide as the longest full path in the rendered subtree, counting rows that
//! the filters hide, so columns line up whatever the thresholds are.
//!
//! `%total` is relative to the global root, for every tree, explicit roots
//! included.
//!
//! Rendering locks one node at a time. A report taken while other threads
//! are still timing may mix before and after states of different nodes.

use std::fmt::Write;

use crate::config::ReportOptions;
use crate::registry::{Arena, NodeId};

const PATH_TITLE: &str = "path";

/// Column titles for a table whose path column is `path_width` wide.
pub fn header(path_width: usize) -> String {
    let width = path_width.max(PATH_TITLE.len());
    format!(
        "{:<width$} {:>8} {:>8} {:>8} {:>12} {:>22} {:>22}\n",
        PATH_TITLE, "%total", "%parent", "count", "total(s)", "mean+-std(s)", "min~max(s)",
    )
}

struct Walk<'a> {
    arena: &'a Arena,
    width: usize,
    top_total: f64,
    min_total: f64,
    min_parent: f64,
}

/// Rows for `id` and its subtree, without the header.
pub(crate) fn render(arena: &Arena, id: NodeId, options: &ReportOptions) -> String {
    let walk = Walk {
        arena,
        width: arena.path_width(id).max(PATH_TITLE.len()),
        top_total: arena
            .node(arena.root())
            .map_or(0.0, |n| n.with_stats(|s| s.total)),
        min_total: options.min_total_percent * 100.0,
        min_parent: options.min_parent_percent * 100.0,
    };
    let mut out = String::new();
    walk.visit(id, &mut out);
    out
}

impl Walk<'_> {
    fn visit(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.arena.node(id) else {
            return;
        };
        let (count, total, mean, std, min, max) = node.with_stats(|s| {
            (s.count, s.total, s.mean, s.standard_deviation, s.min, s.max)
        });

        let total_percent = total / self.top_total.max(f64::EPSILON) * 100.0;
        let parent_percent = match node.parent.and_then(|p| self.arena.node(p)) {
            Some(parent) => {
                let parent_total = parent.with_stats(|s| s.total);
                total / parent_total.max(f64::EPSILON) * 100.0
            }
            None => total_percent,
        };

        if total_percent >= self.min_total && parent_percent >= self.min_parent {
            let _ = writeln!(
                out,
                "{:<width$} {:>7.2}% {:>7.2}% {:>8} {:>12.6} {:>22} {:>22}",
                node.full_path,
                total_percent,
                parent_percent,
                count,
                total,
                format!("{mean:.6}+-{std:.6}"),
                format!("{min:.6}~{max:.6}"),
                width = self.width,
            );
        }

        for child in self.arena.sorted_children(id) {
            self.visit(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReportOptions;
    use crate::registry::{Parent, Registry};

    fn rows(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn header_has_all_columns() {
        let header = super::header(12);
        for title in ["path", "%total", "%parent", "count", "total(s)", "mean+-std(s)", "min~max(s)"] {
            assert!(header.contains(title), "missing {title} in {header:?}");
        }
        assert!(header.starts_with("path         "));
        assert!(header.ends_with('\n'));
    }

    #[test]
    fn children_render_in_name_order() {
        let registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.resolve(name, Parent::Global, false).record(1.0);
        }
        let text = registry.root().render(ReportOptions::default());
        let paths: Vec<&str> = rows(&text)
            .into_iter()
            .map(|r| r.split_whitespace().next().unwrap_or(""))
            .collect();
        // The root row has an empty path, so its first token is the percentage.
        assert_eq!(paths[1..], ["/alpha", "/mid", "/zeta"]);
    }

    #[test]
    fn percentages_are_relative_to_root_and_parent() {
        let registry = Registry::new();
        let p = registry.resolve("p", Parent::Global, false);
        let f = registry.resolve("f", p, false);
        let g = registry.resolve("g", p, false);
        // p is idle, so both samples are back-filled into p and the root.
        f.record(1.0);
        g.record(3.0);

        let text = p.render(ReportOptions::default());
        let lines = rows(&text);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("/p "), "{text}");
        assert!(lines[0].contains(" 100.00%  100.00%"), "{text}");
        assert!(lines[1].starts_with("/p/f"), "{text}");
        assert!(lines[1].contains("  25.00%   25.00%"), "{text}");
        assert!(lines[2].starts_with("/p/g"), "{text}");
        assert!(lines[2].contains("  75.00%   75.00%"), "{text}");
        assert!(lines[2].contains("3.000000+-0.000000"), "{text}");
        assert!(lines[0].contains("1.000000~3.000000"), "{text}");
    }

    #[test]
    fn filters_hide_rows_but_keep_descending() {
        let registry = Registry::new();
        let p = registry.resolve("p", Parent::Global, false);
        let f = registry.resolve("f", p, false);
        let g = registry.resolve("g", p, false);
        let inner = registry.resolve("inner", f, false);
        inner.record(1.0);
        g.record(9.0);

        // f holds 10% of the time, inner too, g 90%.
        let all = p.render(ReportOptions::default());
        assert_eq!(rows(&all).len(), 4);

        let half = p.render(ReportOptions::new().with_min_total_percent(0.5));
        let half_rows = rows(&half);
        assert_eq!(half_rows.len(), 2, "{half}");
        assert!(half_rows[0].starts_with("/p "));
        assert!(half_rows[1].starts_with("/p/g"));

        // inner is 100% of its parent f but only 10% of the tree.
        let by_parent = p.render(ReportOptions::new().with_min_parent_percent(0.95));
        let by_parent_rows = rows(&by_parent);
        assert_eq!(by_parent_rows.len(), 2, "{by_parent}");
        assert!(by_parent_rows[0].starts_with("/p "));
        assert!(by_parent_rows[1].starts_with("/p/f/inner"));

        let everything = p.render(ReportOptions::new().with_min_total_percent(1.0));
        assert_eq!(rows(&everything).len(), 1);
    }

    #[test]
    fn empty_tree_renders_zero_percent_without_dividing_by_zero() {
        let registry = Registry::new();
        registry.resolve("idle", Parent::Global, false);
        let text = registry.root().render(ReportOptions::default());
        assert_eq!(rows(&text).len(), 2);
        assert!(!text.contains("NaN"), "{text}");
        assert!(!text.contains("inf"), "{text}");
        assert!(text.contains("0.00%"));
    }

    #[test]
    fn rows_line_up_on_the_widest_path() {
        let registry = Registry::new();
        let p = registry.resolve("p", Parent::Global, false);
        let deep = registry.resolve("deeper_child", p, false);
        deep.record(1.0);

        let text = p.render(ReportOptions::default());
        let lines = rows(&text);
        assert_eq!(lines.len(), 2);
        let column = lines[1].find('%').unwrap();
        assert_eq!(lines[0].find('%').unwrap(), column);
        assert_eq!(super::header(p.path_width()).find("%total").unwrap() + 5, column);
    }

    #[test]
    fn explicit_roots_report_against_the_global_total() {
        let registry = Registry::new();
        let p1 = registry.resolve("p1", Parent::Explicit, false);
        let p2 = registry.resolve("p2", Parent::Global, false);
        p1.record(0.01);
        p2.record(0.03);

        let text = p1.render(ReportOptions::default());
        let lines = rows(&text);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("p1 "), "{text}");
        assert!(lines[0].contains("  33.33%   33.33%"), "{text}");

        let text = p2.render(ReportOptions::default());
        assert!(text.contains(" 100.00%  100.00%"), "{text}");
    }

    #[test]
    fn non_ascii_paths_still_line_up() {
        let registry = Registry::new();
        let p = registry.resolve("p", Parent::Global, false);
        registry.resolve("é", p, false).record(1.0);
        registry.resolve("ee", p, false).record(1.0);

        let text = p.render(ReportOptions::default());
        let columns: Vec<usize> = rows(&text)
            .into_iter()
            .map(|r| r.chars().position(|c| c == '%').unwrap())
            .collect();
        assert_eq!(columns.len(), 3);
        assert!(columns.windows(2).all(|w| w[0] == w[1]), "{text}");
    }
}
