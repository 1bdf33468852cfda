//! Cursor position → nearest node
//!
//! The search only looks at where spans start. Among nodes starting on the
//! last line at or before the target, the one starting furthest right but
//! not past the target column wins; equal starts resolve to the outermost
//! node. Span ends are not checked, so a cursor past the end of a line
//! still maps to that line's last-starting node.

use log::trace;

use crate::cst::{NodeIdx, Position, SourceSpan};
use crate::span_index::SpanIndex;

/// Best match for `target`, or `None` when the index is empty.
pub fn nearest_node(index: &SpanIndex, target: Position) -> Option<NodeIdx> {
    let mut candidates: Vec<(NodeIdx, SourceSpan)> = index.entries().to_vec();
    // 稳定排序：起点升序，终点降序（外层节点在前）
    candidates.sort_by(|(_, a), (_, b)| {
        a.start
            .line
            .cmp(&b.start.line)
            .then(a.start.column.cmp(&b.start.column))
            .then(b.end.line.cmp(&a.end.line))
            .then(b.end.column.cmp(&a.end.column))
    });

    let mut best: Option<(NodeIdx, Position)> = None;
    for (node, span) in candidates {
        let start = span.start;
        if start.line > target.line {
            break;
        }

        match best {
            Some((_, best_start)) if start.line <= best_start.line => {
                if start.column > target.column || start.column <= best_start.column {
                    continue;
                }
            }
            // 新的一行：无条件采用
            _ => {}
        }
        best = Some((node, start));
    }

    trace!(
        "nearest node at {}: {:?}",
        target,
        best.map(|(node, _)| node)
    );
    best.map(|(node, _)| node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node: usize, l1: usize, c1: usize, l2: usize, c2: usize) -> (NodeIdx, SourceSpan) {
        (
            NodeIdx::new(node),
            SourceSpan::new(Position::new(l1, c1), Position::new(l2, c2)),
        )
    }

    fn lookup(entries: Vec<(NodeIdx, SourceSpan)>, line: usize, column: usize) -> Option<usize> {
        nearest_node(&SpanIndex::from_entries(entries), Position::new(line, column))
            .map(NodeIdx::index)
    }

    #[test]
    fn test_empty_index() {
        assert_eq!(lookup(Vec::new(), 1, 0), None);
    }

    #[test]
    fn test_outermost_wins_on_equal_start() {
        let entries = vec![
            entry(1, 1, 0, 1, 5),
            entry(2, 2, 0, 2, 3),
            entry(0, 1, 0, 1, 10),
        ];
        assert_eq!(lookup(entries, 1, 2), Some(0));
    }

    #[test]
    fn test_identical_spans_keep_preorder() {
        let entries = vec![entry(3, 1, 0, 1, 1), entry(4, 1, 0, 1, 1)];
        assert_eq!(lookup(entries, 1, 0), Some(3));
    }

    #[test]
    fn test_rightmost_start_before_target() {
        // x = foo(bar)
        let entries = vec![
            entry(0, 1, 0, 1, 12),
            entry(1, 1, 0, 1, 1),
            entry(2, 1, 4, 1, 12),
            entry(3, 1, 4, 1, 7),
            entry(4, 1, 8, 1, 11),
        ];
        assert_eq!(lookup(entries.clone(), 1, 3), Some(0));
        assert_eq!(lookup(entries.clone(), 1, 5), Some(2));
        assert_eq!(lookup(entries.clone(), 1, 9), Some(4));
        // 越过行尾不检查终点
        assert_eq!(lookup(entries, 1, 40), Some(4));
    }

    #[test]
    fn test_line_overshoot() {
        let entries = vec![
            entry(0, 1, 0, 1, 5),
            entry(1, 3, 4, 3, 9),
            entry(2, 3, 6, 3, 9),
        ];
        assert_eq!(lookup(entries.clone(), 10, 0), Some(1));
        assert_eq!(lookup(entries.clone(), 10, 7), Some(2));
        assert_eq!(lookup(entries, 2, 0), Some(0));
    }

    #[test]
    fn test_new_line_adopted_even_right_of_target() {
        let entries = vec![entry(0, 1, 0, 1, 3), entry(1, 2, 8, 2, 9)];
        assert_eq!(lookup(entries, 2, 0), Some(1));
    }

    #[test]
    fn test_target_before_first_span() {
        let entries = vec![entry(0, 3, 0, 3, 4)];
        assert_eq!(lookup(entries, 1, 0), None);
    }
}
