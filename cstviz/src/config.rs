use crate::span_index::IndexMode;

/// 可视化选项
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct VisualizerConfig {
    /// Spaces per nesting level in text and HTML output.
    pub indent_width: usize,
    /// Hide whitespace and newline nodes.
    pub compact: bool,
    /// Give whitespace nodes spans too, so the cursor can land on them.
    pub index_trivia: bool,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            indent_width: 4,
            compact: false,
            index_trivia: false,
        }
    }
}

impl VisualizerConfig {
    pub fn with_indent_width(mut self, indent_width: usize) -> Self {
        self.indent_width = indent_width;
        self
    }

    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    pub fn with_index_trivia(mut self, index_trivia: bool) -> Self {
        self.index_trivia = index_trivia;
        self
    }

    pub fn index_mode(&self) -> IndexMode {
        if self.index_trivia {
            IndexMode::IncludeTrivia
        } else {
            IndexMode::ExcludeTrivia
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = VisualizerConfig::default()
            .with_indent_width(2)
            .with_compact(true);
        assert_eq!(config.indent_width, 2);
        assert!(config.compact);
        assert_eq!(config.index_mode(), IndexMode::ExcludeTrivia);
        assert_eq!(
            config.with_index_trivia(true).index_mode(),
            IndexMode::IncludeTrivia
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_partial() {
        let config: VisualizerConfig = serde_json::from_str(r#"{"compact": true}"#).unwrap();
        assert_eq!(config, VisualizerConfig::default().with_compact(true));

        let config: VisualizerConfig = serde_json::from_str(r#"{"indentWidth": 8}"#).unwrap();
        assert_eq!(config.indent_width, 8);
    }
}
