//! Node → source span table, built once per parse

use std::collections::HashMap;

use crate::cst::{preorder, NodeIdx, SourceSpan, SyntaxTree};

/// Which nodes get an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexMode {
    /// 跳过纯空白节点
    #[default]
    ExcludeTrivia,
    IncludeTrivia,
}

/// Spans of every positioned node, in pre-order.
#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    entries: Vec<(NodeIdx, SourceSpan)>,
    positions: HashMap<NodeIdx, usize>,
}

impl SpanIndex {
    pub fn build<T: SyntaxTree + ?Sized>(tree: &T, mode: IndexMode) -> Self {
        let entries = preorder(tree)
            .into_iter()
            .filter(|&node| mode == IndexMode::IncludeTrivia || !tree.is_trivia(node))
            .filter_map(|node| tree.span(node).map(|span| (node, span)))
            .collect();
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<(NodeIdx, SourceSpan)>) -> Self {
        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, &(node, _))| (node, i))
            .collect();
        Self { entries, positions }
    }

    pub fn get(&self, node: NodeIdx) -> Option<SourceSpan> {
        self.positions.get(&node).map(|&i| self.entries[i].1)
    }

    pub fn contains(&self, node: NodeIdx) -> bool {
        self.positions.contains_key(&node)
    }

    pub fn entries(&self) -> &[(NodeIdx, SourceSpan)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 生成只保留部分节点的新索引
    pub(crate) fn retain(&self, mut keep: impl FnMut(NodeIdx) -> bool) -> Self {
        Self::from_entries(
            self.entries
                .iter()
                .copied()
                .filter(|&(node, _)| keep(node))
                .collect(),
        )
    }
}
