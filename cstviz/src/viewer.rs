//! Editor-facing host: reacts to text edits, cursor moves and anchor clicks

use log::{trace, warn};

use crate::config::VisualizerConfig;
use crate::cst::SourceSpan;
use crate::error::Result;
use crate::identifier::NodeId;
use crate::render::RenderedTree;
use crate::session::{render_tree, Session};

/// Holds the current session. A failed parse leaves everything as it was.
#[derive(Debug, Default)]
pub struct Visualizer {
    config: VisualizerConfig,
    session: Option<Session>,
    rendered: Option<RenderedTree>,
}

impl Visualizer {
    pub fn new(config: VisualizerConfig) -> Self {
        Self {
            config,
            session: None,
            rendered: None,
        }
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn rendered(&self) -> Option<&RenderedTree> {
        self.rendered.as_ref()
    }

    /// 整体重建；解析失败时保留上一次的结果
    pub fn text_changed(&mut self, source: &str) -> Result<&RenderedTree> {
        match render_tree(source, &self.config) {
            Ok((session, rendered)) => {
                self.session = Some(session);
                Ok(self.rendered.insert(rendered))
            }
            Err(err) => {
                warn!("keeping previous tree: {}", err);
                Err(err)
            }
        }
    }

    pub fn cursor_moved(&self, line: usize, column: usize) -> Option<&NodeId> {
        let id = self.session.as_ref()?.lookup_node_at(line, column);
        trace!("cursor {}:{} -> {:?}", line, column, id);
        id
    }

    pub fn anchor_clicked(&self, id: &str) -> Option<SourceSpan> {
        self.session.as_ref()?.resolve_span(id)
    }

    pub fn render_html(&self) -> Option<String> {
        self.rendered
            .as_ref()
            .map(|rendered| rendered.to_html(self.config.indent_width))
    }

    pub fn render_text(&self) -> Option<String> {
        self.rendered
            .as_ref()
            .map(|rendered| rendered.to_text(self.config.indent_width))
    }

    pub fn code(&self) -> Option<String> {
        self.session.as_ref().map(Session::code)
    }

    pub fn code_html(&self) -> Option<String> {
        self.session.as_ref().map(Session::code_html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::Position;

    #[test]
    fn test_failed_parse_keeps_previous_session() {
        let mut visualizer = Visualizer::default();
        assert_eq!(visualizer.cursor_moved(1, 0), None);

        visualizer.text_changed("x = 1\n").unwrap();
        let before = visualizer.rendered().cloned();

        assert!(visualizer.text_changed("x = (\n").is_err());
        assert_eq!(visualizer.rendered().cloned(), before);
        assert_eq!(visualizer.code().as_deref(), Some("x = 1\n"));
        assert_eq!(
            visualizer.cursor_moved(1, 0).map(NodeId::as_str),
            Some("$.body[0](Assign)")
        );
    }

    #[test]
    fn test_new_text_replaces_session() {
        let mut visualizer = Visualizer::new(VisualizerConfig::default().with_indent_width(2));
        visualizer.text_changed("x = 1\n").unwrap();
        visualizer.text_changed("\ny = 2\n").unwrap();

        assert_eq!(
            visualizer.anchor_clicked("$.body[0](Assign)"),
            Some(SourceSpan::new(Position::new(2, 0), Position::new(2, 5)))
        );
        assert!(visualizer
            .render_text()
            .unwrap()
            .starts_with("Module(\n  body=[\n"));
        assert!(visualizer.render_html().unwrap().contains("cst-node"));
    }

    #[test]
    fn test_code_html_follows_session() {
        let mut visualizer = Visualizer::default();
        assert_eq!(visualizer.code_html(), None);

        visualizer.text_changed("pass\n").unwrap();
        assert!(visualizer.text_changed("pass pass\n").is_err());
        assert_eq!(
            visualizer.code_html().as_deref(),
            Some("<pre class=\"cst-code\"><span class=\"tok-keyword\">pass</span>\n</pre>")
        );
    }
}
