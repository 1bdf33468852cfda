//! Tree renderer
//!
//! Turns a parsed tree into a nested, anchor-annotated structure. The
//! structured form is what the browser consumes; [`RenderedTree::to_text`]
//! and [`RenderedTree::to_html`] lay it out the way LibCST prints trees.

use crate::cst::{FieldValue, NodeIdx, Scalar, SourceSpan, SyntaxTree};
use crate::error::{Error, Result};
use crate::identifier::{IdentifierTable, NodeId};
use crate::span_index::SpanIndex;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RenderedTree {
    pub root: RenderedNode,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RenderedNode {
    /// 点击锚点
    pub id: NodeId,
    pub kind: String,
    pub span: Option<SourceSpan>,
    pub fields: Vec<RenderedField>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RenderedField {
    pub name: String,
    pub value: RenderedValue,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "value", rename_all = "lowercase")
)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum RenderedValue {
    Literal(Literal),
    Node(RenderedNode),
    Sequence(Vec<RenderedValue>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "value", rename_all = "lowercase")
)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    None,
}

impl Literal {
    /// CSS class of the rendered literal.
    pub fn class(&self) -> &'static str {
        match self {
            Literal::String(_) => "cst-string",
            Literal::Integer(_) | Literal::Float(_) => "cst-number",
            Literal::Boolean(_) => "cst-bool",
            Literal::None => "cst-none",
        }
    }

    /// Python 风格的字面量文本
    pub fn repr(&self) -> String {
        match self {
            Literal::String(value) => python_repr(value),
            Literal::Integer(value) => value.to_string(),
            Literal::Float(value) => format!("{:?}", value),
            Literal::Boolean(true) => "True".to_string(),
            Literal::Boolean(false) => "False".to_string(),
            Literal::None => "None".to_string(),
        }
    }
}

impl From<&Scalar> for Literal {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Str(value) => Literal::String(value.clone()),
            Scalar::Int(value) => Literal::Integer(*value),
            Scalar::Float(value) => Literal::Float(*value),
            Scalar::Bool(value) => Literal::Boolean(*value),
            Scalar::None => Literal::None,
        }
    }
}

/// Quote a string the way Python's `repr` does.
fn python_repr(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c == '\x7f' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Walks a tree in the identifier assigner's order.
pub struct Renderer<'a, T: SyntaxTree + ?Sized> {
    tree: &'a T,
    spans: &'a SpanIndex,
    ids: &'a IdentifierTable,
    /// 紧凑模式：跳过空白节点
    compact: bool,
    visited: usize,
}

impl<'a, T: SyntaxTree + ?Sized> Renderer<'a, T> {
    pub fn new(tree: &'a T, spans: &'a SpanIndex, ids: &'a IdentifierTable) -> Self {
        Self {
            tree,
            spans,
            ids,
            compact: false,
            visited: 0,
        }
    }

    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    pub fn render(mut self) -> Result<RenderedTree> {
        let root = self.render_node(self.tree.root())?;

        // 渲染遍历和编号遍历必须覆盖同一组节点
        if self.visited != self.ids.len() {
            return Err(Error::InvariantViolation(format!(
                "renderer visited {} nodes but {} have identifiers",
                self.visited,
                self.ids.len()
            )));
        }

        Ok(RenderedTree { root })
    }

    fn skip(&self, node: NodeIdx) -> bool {
        self.compact && self.tree.is_trivia(node)
    }

    fn render_node(&mut self, node: NodeIdx) -> Result<RenderedNode> {
        let tree = self.tree;
        let id = self.ids.get(node).cloned().ok_or_else(|| {
            Error::InvariantViolation(format!(
                "{} node has no identifier",
                tree.kind_name(node)
            ))
        })?;
        self.visited += 1;

        let mut fields = Vec::new();
        for field in tree.fields(node) {
            let value = match &field.value {
                FieldValue::Scalar(scalar) => RenderedValue::Literal(scalar.into()),
                FieldValue::Node(child) => {
                    if self.skip(*child) {
                        continue;
                    }
                    RenderedValue::Node(self.render_node(*child)?)
                }
                FieldValue::Sequence(children) | FieldValue::Set(children) => {
                    let mut items = Vec::with_capacity(children.len());
                    for &child in children {
                        if !self.skip(child) {
                            items.push(RenderedValue::Node(self.render_node(child)?));
                        }
                    }
                    RenderedValue::Sequence(items)
                }
            };
            fields.push(RenderedField {
                name: field.name.to_string(),
                value,
            });
        }

        Ok(RenderedNode {
            id,
            kind: tree.kind_name(node).to_string(),
            span: self.spans.get(node),
            fields,
        })
    }
}

/// 渲染整棵树；`compact` 时跳过空白节点
pub fn render<T: SyntaxTree + ?Sized>(
    tree: &T,
    spans: &SpanIndex,
    ids: &IdentifierTable,
    compact: bool,
) -> Result<RenderedTree> {
    Renderer::new(tree, spans, ids).compact(compact).render()
}

impl RenderedTree {
    /// All anchors in rendering order.
    pub fn ids(&self) -> Vec<&NodeId> {
        let mut ids = Vec::new();
        self.root.collect_ids(&mut ids);
        ids
    }

    pub fn find(&self, id: &str) -> Option<&RenderedNode> {
        self.root.find(id)
    }

    pub fn to_text(&self, indent_width: usize) -> String {
        let mut writer = TreeWriter::new(indent_width, false);
        writer.node(&self.root, 0);
        writer.out
    }

    pub fn to_html(&self, indent_width: usize) -> String {
        let mut writer = TreeWriter::new(indent_width, true);
        writer.out.push_str("<pre class=\"cst-tree\">");
        writer.node(&self.root, 0);
        writer.out.push_str("</pre>");
        writer.out
    }
}

impl RenderedNode {
    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a NodeId>) {
        ids.push(&self.id);
        for field in &self.fields {
            field.value.collect_ids(ids);
        }
    }

    fn find(&self, id: &str) -> Option<&RenderedNode> {
        if self.id.as_str() == id {
            return Some(self);
        }
        self.fields.iter().find_map(|field| field.value.find(id))
    }
}

impl RenderedValue {
    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a NodeId>) {
        match self {
            RenderedValue::Literal(_) => {}
            RenderedValue::Node(node) => node.collect_ids(ids),
            RenderedValue::Sequence(items) => {
                for item in items {
                    item.collect_ids(ids);
                }
            }
        }
    }

    fn find(&self, id: &str) -> Option<&RenderedNode> {
        match self {
            RenderedValue::Literal(_) => None,
            RenderedValue::Node(node) => node.find(id),
            RenderedValue::Sequence(items) => items.iter().find_map(|item| item.find(id)),
        }
    }
}

struct TreeWriter {
    indent_width: usize,
    html: bool,
    out: String,
}

impl TreeWriter {
    fn new(indent_width: usize, html: bool) -> Self {
        Self {
            indent_width,
            html,
            out: String::new(),
        }
    }

    fn indent(&mut self, depth: usize) {
        self.out
            .extend(std::iter::repeat(' ').take(depth * self.indent_width));
    }

    fn text(&mut self, text: &str) {
        if self.html {
            self.out.push_str(&escape_html(text));
        } else {
            self.out.push_str(text);
        }
    }

    fn node(&mut self, node: &RenderedNode, depth: usize) {
        if self.html {
            self.out.push_str("<span class=\"cst-node\" id=\"");
            self.out.push_str(&escape_html(node.id.as_str()));
            self.out.push('"');
            if let Some(span) = node.span {
                self.out.push_str(&format!(" data-span=\"{}\"", span));
            }
            self.out.push('>');
        }

        self.text(&node.kind);
        self.out.push('(');
        if !node.fields.is_empty() {
            self.out.push('\n');
            for field in &node.fields {
                self.indent(depth + 1);
                self.text(&field.name);
                self.out.push('=');
                self.value(&field.value, depth + 1);
                self.out.push_str(",\n");
            }
            self.indent(depth);
        }
        self.out.push(')');

        if self.html {
            self.out.push_str("</span>");
        }
    }

    fn value(&mut self, value: &RenderedValue, depth: usize) {
        match value {
            RenderedValue::Literal(literal) => {
                if self.html {
                    self.out
                        .push_str(&format!("<span class=\"{}\">", literal.class()));
                    self.text(&literal.repr());
                    self.out.push_str("</span>");
                } else {
                    self.out.push_str(&literal.repr());
                }
            }
            RenderedValue::Node(node) => self.node(node, depth),
            RenderedValue::Sequence(items) if items.is_empty() => self.out.push_str("[]"),
            RenderedValue::Sequence(items) => {
                self.out.push_str("[\n");
                for item in items {
                    self.indent(depth + 1);
                    self.value(item, depth + 1);
                    self.out.push_str(",\n");
                }
                self.indent(depth);
                self.out.push(']');
            }
        }
    }
}
