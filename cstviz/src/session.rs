//! One parsed document: tree, span index and identifiers

use log::debug;

use crate::config::VisualizerConfig;
use crate::cst::{codegen, highlight_html, parse_module, NodeIdx, Position, SourceSpan, Tree};
use crate::error::Result;
use crate::identifier::{IdentifierTable, NodeId};
use crate::locator::nearest_node;
use crate::render::{render, RenderedTree};
use crate::span_index::SpanIndex;

/// The three tables always describe the same tree and are replaced together.
#[derive(Debug, Clone)]
pub struct Session {
    tree: Tree,
    spans: SpanIndex,
    ids: IdentifierTable,
    compact: bool,
}

impl Session {
    pub fn parse(source: &str, config: &VisualizerConfig) -> Result<Self> {
        let tree = parse_module(source)?;
        Self::from_tree(tree, config)
    }

    pub fn from_tree(tree: Tree, config: &VisualizerConfig) -> Result<Self> {
        let spans = SpanIndex::build(&tree, config.index_mode());
        let ids = IdentifierTable::build(&tree)?;
        debug!(
            "parsed {} nodes, {} spans indexed",
            tree.len(),
            spans.len()
        );

        let session = Self {
            tree,
            spans,
            ids,
            compact: false,
        };
        Ok(if config.compact {
            session.into_compact()
        } else {
            session
        })
    }

    /// 同时从编号表和 span 索引中去掉空白节点
    pub fn into_compact(self) -> Self {
        let ids = self.ids.compact(&self.tree);
        let spans = self.spans.retain(|node| ids.contains(node));
        Self {
            ids,
            spans,
            compact: true,
            ..self
        }
    }

    pub fn render(&self) -> Result<RenderedTree> {
        render(&self.tree, &self.spans, &self.ids, self.compact)
    }

    pub fn node_at(&self, position: Position) -> Option<NodeIdx> {
        nearest_node(&self.spans, position)
    }

    /// 光标位置（行 1-based，列 0-based）对应的节点编号
    pub fn lookup_node_at(&self, line: usize, column: usize) -> Option<&NodeId> {
        self.node_at(Position::new(line, column))
            .and_then(|node| self.ids.get(node))
    }

    pub fn resolve_span(&self, id: &str) -> Option<SourceSpan> {
        self.ids.node(id).and_then(|node| self.spans.get(node))
    }

    /// Regenerated source text.
    pub fn code(&self) -> String {
        codegen(&self.tree)
    }

    /// Regenerated source as HTML, one span per token.
    pub fn code_html(&self) -> String {
        highlight_html(&self.tree)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn spans(&self) -> &SpanIndex {
        &self.spans
    }

    pub fn ids(&self) -> &IdentifierTable {
        &self.ids
    }

    pub fn is_compact(&self) -> bool {
        self.compact
    }
}

/// 解析并渲染；失败时不产生任何状态
pub fn render_tree(source: &str, config: &VisualizerConfig) -> Result<(Session, RenderedTree)> {
    let session = Session::parse(source, config)?;
    let rendered = session.render()?;
    Ok((session, rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_round_trip() {
        let (session, rendered) = render_tree("x = 1\n", &VisualizerConfig::default()).unwrap();

        let assign = rendered.find("$.body[0](Assign)").unwrap();
        assert_eq!(assign.span, session.resolve_span("$.body[0](Assign)"));
        assert_eq!(
            session.resolve_span("$.body[0](Assign)"),
            Some(SourceSpan::new(Position::new(1, 0), Position::new(1, 5)))
        );
        assert_eq!(
            session.lookup_node_at(1, 0).map(NodeId::as_str),
            Some("$.body[0](Assign)")
        );
        assert_eq!(
            session.lookup_node_at(1, 4).map(NodeId::as_str),
            Some("$.body[0].value(Integer)")
        );
    }

    #[test]
    fn test_unknown_id_and_unpositioned_node() {
        let (session, _) = render_tree("x = 1\n", &VisualizerConfig::default()).unwrap();
        assert_eq!(session.resolve_span("$.nope(Name)"), None);
        assert_eq!(session.resolve_span("$(Module)"), None);
        assert_eq!(
            session.resolve_span("$.body[0].trailing_whitespace(TrailingWhitespace)"),
            None
        );
    }

    #[test]
    fn test_empty_source() {
        let (session, rendered) = render_tree("", &VisualizerConfig::default()).unwrap();
        assert!(session.spans().is_empty());
        assert_eq!(session.lookup_node_at(1, 0), None);
        assert_eq!(rendered.root.kind, "Module");
    }

    #[test]
    fn test_parse_error() {
        let error = render_tree("x = = 1\n", &VisualizerConfig::default()).unwrap_err();
        assert!(matches!(error, Error::Parse(e) if e.line == 1));
    }

    #[test]
    fn test_compact_session() {
        let config = VisualizerConfig::default()
            .with_compact(true)
            .with_index_trivia(true);
        let (session, rendered) = render_tree("x = 1  # c\n", &config).unwrap();

        assert!(session.is_compact());
        assert_eq!(rendered.ids().len(), session.ids().len());
        for &(node, _) in session.spans().entries() {
            assert!(session.ids().contains(node));
        }
        // 行尾注释在 TrailingWhitespace 之下，一并隐藏
        assert_eq!(
            session.lookup_node_at(1, 9).map(NodeId::as_str),
            Some("$.body[0].value(Integer)")
        );
    }

    #[test]
    fn test_index_trivia() {
        let config = VisualizerConfig::default().with_index_trivia(true);
        let (session, _) = render_tree("x = 1  # c\n", &config).unwrap();
        assert_eq!(
            session.lookup_node_at(1, 9).map(NodeId::as_str),
            Some("$.body[0].trailing_whitespace.comment(Comment)")
        );
    }

    #[test]
    fn test_code() {
        let source = "def f(x):\n    return x  # id\n";
        let session = Session::parse(source, &VisualizerConfig::default()).unwrap();
        assert_eq!(session.code(), source);
    }

    #[test]
    fn test_code_html() {
        let session = Session::parse("x = 'a<b'\n", &VisualizerConfig::default()).unwrap();
        assert_eq!(
            session.code_html(),
            "<pre class=\"cst-code\"><span class=\"tok-name\">x</span> \
             <span class=\"tok-operator\">=</span> \
             <span class=\"tok-string\">&#39;a&lt;b&#39;</span>\n</pre>"
        );
    }
}
