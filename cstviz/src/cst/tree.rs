//! Arena-backed concrete syntax tree
//!
//! Nodes are stored in a flat arena in pre-order and addressed by [`NodeIdx`].
//! Two nodes with identical content are still distinct entries, so tables
//! built over a tree key on the index, never on node equality.

use super::kind::NodeKind;
use super::span::SourceSpan;

/// 节点在 arena 中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdx(u32);

impl NodeIdx {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("syntax tree exceeds u32::MAX nodes"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 标量字段值（不可作为节点寻址）
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// The closed set of shapes a field can take.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Scalar),
    Node(NodeIdx),
    /// Ordered children.
    Sequence(Vec<NodeIdx>),
    /// Unordered children; traversed in storage order.
    Set(Vec<NodeIdx>),
}

impl FieldValue {
    /// 字段直接持有的子节点
    pub fn children(&self) -> &[NodeIdx] {
        match self {
            FieldValue::Scalar(_) => &[],
            FieldValue::Node(node) => std::slice::from_ref(node),
            FieldValue::Sequence(nodes) | FieldValue::Set(nodes) => nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub value: FieldValue,
}

/// What the visualizer needs from a parsed tree.
///
/// The span index, identifier assigner and renderer only reach the tree
/// through this trait, so any parser producing typed nodes with named fields
/// and per-node spans can be plugged in.
pub trait SyntaxTree {
    fn root(&self) -> NodeIdx;

    fn kind_name(&self, node: NodeIdx) -> &str;

    /// Fields in declaration order.
    fn fields(&self, node: NodeIdx) -> &[Field];

    /// Position reported by the parser, if any.
    fn span(&self, node: NodeIdx) -> Option<SourceSpan>;

    /// Whitespace-only nodes that never act as click targets.
    fn is_trivia(&self, node: NodeIdx) -> bool {
        TRIVIA_KINDS.contains(&self.kind_name(node))
    }
}

pub const TRIVIA_KINDS: [&str; 3] = ["TrailingWhitespace", "SimpleWhitespace", "Newline"];

/// Pre-order walk over every node reachable from the root.
pub fn preorder<T: SyntaxTree + ?Sized>(tree: &T) -> Vec<NodeIdx> {
    let mut order = Vec::new();
    let mut stack = vec![tree.root()];

    while let Some(node) = stack.pop() {
        order.push(node);
        for field in tree.fields(node).iter().rev() {
            stack.extend(field.value.children().iter().rev());
        }
    }

    order
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    fields: Vec<Field>,
    span: Option<SourceSpan>,
}

/// 解析结果：一棵按先序存放的语法树
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeIdx,
}

impl Tree {
    /// 将构建器展开为 arena，节点按先序分配下标
    ///
    /// 用显式栈展开，长的运算符链不会耗尽调用栈。
    pub fn build(root: NodeBuilder) -> Self {
        let mut nodes: Vec<NodeData> = Vec::new();
        let mut stack = vec![(root, None)];

        while let Some((mut builder, slot)) = stack.pop() {
            let idx = NodeIdx::new(nodes.len());
            if let Some(Slot { parent, field, item }) = slot {
                nodes[parent.index()].fields[field].value.place(item, idx);
            }

            let mut fields = Vec::with_capacity(builder.fields.len());
            let mut pending = Vec::new();
            for (position, (name, value)) in std::mem::take(&mut builder.fields).into_iter().enumerate() {
                let slot = |item| Slot {
                    parent: idx,
                    field: position,
                    item,
                };
                let value = match value {
                    BuilderValue::Scalar(scalar) => FieldValue::Scalar(scalar),
                    BuilderValue::Node(child) => {
                        pending.push((*child, slot(0)));
                        FieldValue::Node(idx)
                    }
                    BuilderValue::Sequence(children) => {
                        let placeholders = vec![idx; children.len()];
                        pending.extend(children.into_iter().enumerate().map(|(i, c)| (c, slot(i))));
                        FieldValue::Sequence(placeholders)
                    }
                    BuilderValue::Set(children) => {
                        let placeholders = vec![idx; children.len()];
                        pending.extend(children.into_iter().enumerate().map(|(i, c)| (c, slot(i))));
                        FieldValue::Set(placeholders)
                    }
                };
                fields.push(Field { name, value });
            }

            nodes.push(NodeData {
                kind: builder.kind,
                fields,
                span: builder.span,
            });
            // 逆序入栈，先弹出的是第一个子节点
            stack.extend(pending.into_iter().rev().map(|(child, slot)| (child, Some(slot))));
        }

        Self {
            nodes,
            root: NodeIdx::new(0),
        }
    }

    /// 从根到最深节点的层数（根为 0），以及最深的那个节点
    pub fn depth(&self) -> (usize, NodeIdx) {
        let mut deepest = (0, self.root);
        let mut stack = vec![(self.root, 0)];

        while let Some((node, depth)) = stack.pop() {
            if depth > deepest.0 {
                deepest = (depth, node);
            }
            for field in self.fields(node) {
                stack.extend(field.value.children().iter().map(|&child| (child, depth + 1)));
            }
        }

        deepest
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, node: NodeIdx) -> NodeKind {
        self.nodes[node.index()].kind
    }

    pub fn field(&self, node: NodeIdx, name: &str) -> Option<&FieldValue> {
        self.fields(node)
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// 单节点字段；字段缺失或为 None 时返回 None
    pub fn child(&self, node: NodeIdx, name: &str) -> Option<NodeIdx> {
        match self.field(node, name) {
            Some(FieldValue::Node(child)) => Some(*child),
            _ => None,
        }
    }

    pub fn children(&self, node: NodeIdx, name: &str) -> &[NodeIdx] {
        match self.field(node, name) {
            Some(value) => value.children(),
            None => &[],
        }
    }

    pub fn scalar(&self, node: NodeIdx, name: &str) -> Option<&Scalar> {
        match self.field(node, name) {
            Some(FieldValue::Scalar(scalar)) => Some(scalar),
            _ => None,
        }
    }

    pub fn str_value(&self, node: NodeIdx, name: &str) -> Option<&str> {
        match self.scalar(node, name) {
            Some(Scalar::Str(value)) => Some(value),
            _ => None,
        }
    }
}

impl SyntaxTree for Tree {
    fn root(&self) -> NodeIdx {
        self.root
    }

    fn kind_name(&self, node: NodeIdx) -> &str {
        self.kind(node).as_str()
    }

    fn fields(&self, node: NodeIdx) -> &[Field] {
        &self.nodes[node.index()].fields
    }

    fn span(&self, node: NodeIdx) -> Option<SourceSpan> {
        self.nodes[node.index()].span
    }

    fn is_trivia(&self, node: NodeIdx) -> bool {
        self.kind(node).is_trivia()
    }
}

/// 子节点在父节点字段中的位置
#[derive(Debug, Clone, Copy)]
struct Slot {
    parent: NodeIdx,
    field: usize,
    item: usize,
}

impl FieldValue {
    fn place(&mut self, item: usize, child: NodeIdx) {
        match self {
            FieldValue::Node(node) => *node = child,
            FieldValue::Sequence(nodes) | FieldValue::Set(nodes) => nodes[item] = child,
            FieldValue::Scalar(_) => {}
        }
    }
}

#[derive(Debug, Clone)]
enum BuilderValue {
    Scalar(Scalar),
    Node(Box<NodeBuilder>),
    Sequence(Vec<NodeBuilder>),
    Set(Vec<NodeBuilder>),
}

/// 解析期间使用的自有节点，解析成功后由 [`Tree::build`] 展开
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    kind: NodeKind,
    span: Option<SourceSpan>,
    fields: Vec<(&'static str, BuilderValue)>,
}

impl NodeBuilder {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            span: None,
            fields: Vec::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn source_span(&self) -> Option<SourceSpan> {
        self.span
    }

    pub fn span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn span_opt(mut self, span: Option<SourceSpan>) -> Self {
        self.span = span;
        self
    }

    pub fn node(mut self, name: &'static str, child: NodeBuilder) -> Self {
        self.fields.push((name, BuilderValue::Node(Box::new(child))));
        self
    }

    /// 可选子节点，缺失时记为标量 None
    pub fn opt(self, name: &'static str, child: Option<NodeBuilder>) -> Self {
        match child {
            Some(child) => self.node(name, child),
            None => self.scalar(name, Scalar::None),
        }
    }

    pub fn seq(mut self, name: &'static str, children: Vec<NodeBuilder>) -> Self {
        self.fields.push((name, BuilderValue::Sequence(children)));
        self
    }

    pub fn set(mut self, name: &'static str, children: Vec<NodeBuilder>) -> Self {
        self.fields.push((name, BuilderValue::Set(children)));
        self
    }

    pub fn scalar(mut self, name: &'static str, value: impl Into<Scalar>) -> Self {
        self.fields.push((name, BuilderValue::Scalar(value.into())));
        self
    }
}

impl Drop for NodeBuilder {
    // 逐层拆开子节点，深链释放时不递归
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.fields);
        while let Some((_, value)) = stack.pop() {
            match value {
                BuilderValue::Node(mut child) => stack.append(&mut child.fields),
                BuilderValue::Sequence(children) | BuilderValue::Set(children) => {
                    for mut child in children {
                        stack.append(&mut child.fields);
                    }
                }
                BuilderValue::Scalar(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::span::Position;

    fn span(l1: usize, c1: usize, l2: usize, c2: usize) -> SourceSpan {
        SourceSpan::new(Position::new(l1, c1), Position::new(l2, c2))
    }

    fn sample() -> Tree {
        Tree::build(
            NodeBuilder::new(NodeKind::Module)
                .seq(
                    "body",
                    vec![
                        NodeBuilder::new(NodeKind::Expr)
                            .span(span(1, 0, 1, 1))
                            .node(
                                "value",
                                NodeBuilder::new(NodeKind::Name)
                                    .span(span(1, 0, 1, 1))
                                    .scalar("value", "x"),
                            ),
                        NodeBuilder::new(NodeKind::Pass).span(span(2, 0, 2, 4)),
                    ],
                )
                .opt("comment", None)
                .scalar("encoding", "utf-8"),
        )
    }

    #[test]
    fn test_build_allocates_in_preorder() {
        let tree = sample();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.root(), NodeIdx::new(0));

        let order = preorder(&tree);
        assert_eq!(order, (0..4).map(NodeIdx::new).collect::<Vec<_>>());

        let kinds: Vec<_> = order.iter().map(|&n| tree.kind_name(n)).collect();
        assert_eq!(kinds, ["Module", "Expr", "Name", "Pass"]);
    }

    #[test]
    fn test_field_accessors() {
        let tree = sample();
        let root = tree.root();
        let body = tree.children(root, "body");
        assert_eq!(body.len(), 2);

        let name = tree.child(body[0], "value").unwrap();
        assert_eq!(tree.str_value(name, "value"), Some("x"));
        assert_eq!(tree.span(name), Some(span(1, 0, 1, 1)));

        assert_eq!(tree.child(root, "comment"), None);
        assert_eq!(tree.scalar(root, "comment"), Some(&Scalar::None));
        assert!(tree.children(root, "missing").is_empty());
        assert_eq!(tree.span(root), None);
    }

    #[test]
    fn test_depth() {
        let tree = sample();
        let (depth, deepest) = tree.depth();
        assert_eq!(depth, 2);
        assert_eq!(tree.kind(deepest), NodeKind::Name);
    }

    #[test]
    fn test_deep_chain_builds_and_drops() {
        let mut node = NodeBuilder::new(NodeKind::Name).scalar("value", "x");
        for _ in 0..200_000 {
            node = NodeBuilder::new(NodeKind::UnaryOperation).node("expression", node);
        }

        let tree = Tree::build(node);
        assert_eq!(tree.len(), 200_001);
        assert_eq!(tree.depth().0, 200_000);
        assert_eq!(preorder(&tree).len(), tree.len());

        // 未展开的构建器同样可以直接丢弃
        let mut node = NodeBuilder::new(NodeKind::Pass);
        for _ in 0..200_000 {
            node = NodeBuilder::new(NodeKind::Expr).seq("body", vec![node]);
        }
        drop(node);
    }
}
