//! Concrete Syntax Tree (CST) module
//!
//! This module provides a lossless syntax tree for a Python subset: every
//! token, whitespace run and comment of the input is kept, so the tree can be
//! rendered node by node and regenerated back into the exact source text.

pub mod codegen;
pub mod highlight;
pub mod kind;
pub mod parser;
pub mod span;
pub mod tree;

pub use codegen::{codegen, CodeGenerator, TokenClass, TokenWriter};
pub use highlight::{highlight_html, HtmlWriter};
pub use kind::NodeKind;
pub use parser::parse_module;
pub use span::{Position, SourceSpan, Span};
pub use tree::{preorder, Field, FieldValue, NodeBuilder, NodeIdx, Scalar, SyntaxTree, Tree};
