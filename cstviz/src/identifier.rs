//! Path-based node identifiers
//!
//! Each node is named by the route from the root: the field names taken, an
//! index for sequence-valued fields, and the node's own kind, e.g.
//! `$.body[0](Assign)`. Identifiers are positional, so they are stable for a
//! given text but say nothing about identity across edits.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::cst::{FieldValue, NodeIdx, SyntaxTree};
use crate::error::{Error, Result};

pub const ROOT_PREFIX: &str = "$";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Bidirectional NodeIdx ↔ NodeId map, in pre-order.
#[derive(Debug, Clone, Default)]
pub struct IdentifierTable {
    order: Vec<(NodeIdx, NodeId)>,
    by_node: HashMap<NodeIdx, usize>,
    by_id: HashMap<NodeId, NodeIdx>,
}

impl IdentifierTable {
    pub fn build<T: SyntaxTree + ?Sized>(tree: &T) -> Result<Self> {
        Self::build_with_prefix(tree, ROOT_PREFIX)
    }

    pub fn build_with_prefix<T: SyntaxTree + ?Sized>(tree: &T, prefix: &str) -> Result<Self> {
        let mut table = Self::default();
        table.assign(tree, tree.root(), prefix.to_string())?;
        Ok(table)
    }

    fn assign<T: SyntaxTree + ?Sized>(
        &mut self,
        tree: &T,
        node: NodeIdx,
        prefix: String,
    ) -> Result<()> {
        self.insert(node, NodeId(format!("{}({})", prefix, tree.kind_name(node))))?;

        for field in tree.fields(node) {
            match &field.value {
                FieldValue::Scalar(_) => {}
                FieldValue::Node(child) => {
                    self.assign(tree, *child, format!("{}.{}", prefix, field.name))?;
                }
                FieldValue::Sequence(children) | FieldValue::Set(children) => {
                    for (i, child) in children.iter().enumerate() {
                        self.assign(tree, *child, format!("{}.{}[{}]", prefix, field.name, i))?;
                    }
                }
            }
        }

        Ok(())
    }

    fn insert(&mut self, node: NodeIdx, id: NodeId) -> Result<()> {
        if self.by_id.contains_key(&id) {
            return Err(Error::InvariantViolation(format!(
                "duplicate node id {}",
                id
            )));
        }
        if self.by_node.contains_key(&node) {
            return Err(Error::InvariantViolation(format!(
                "node {} reached twice (already {})",
                id,
                self.order[self.by_node[&node]].1
            )));
        }

        self.by_node.insert(node, self.order.len());
        self.by_id.insert(id.clone(), node);
        self.order.push((node, id));
        Ok(())
    }

    /// 去掉空白节点及其子树，编号保持不变
    pub fn compact<T: SyntaxTree + ?Sized>(&self, tree: &T) -> Self {
        let mut reachable = HashSet::new();
        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            if tree.is_trivia(node) {
                continue;
            }
            reachable.insert(node);
            for field in tree.fields(node) {
                stack.extend(field.value.children());
            }
        }

        let mut table = Self::default();
        for (node, id) in &self.order {
            if reachable.contains(node) {
                table.by_node.insert(*node, table.order.len());
                table.by_id.insert(id.clone(), *node);
                table.order.push((*node, id.clone()));
            }
        }
        table
    }

    pub fn get(&self, node: NodeIdx) -> Option<&NodeId> {
        self.by_node.get(&node).map(|&i| &self.order[i].1)
    }

    pub fn node(&self, id: &str) -> Option<NodeIdx> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, node: NodeIdx) -> bool {
        self.by_node.contains_key(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIdx, &NodeId)> + '_ {
        self.order.iter().map(|(node, id)| (*node, id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
