//! Syntax-highlighted source view
//!
//! The regenerated source is written through [`HtmlWriter`], which wraps each
//! token in a `<span class="tok-…">` named after its [`TokenClass`]. Whitespace
//! is written unwrapped, so stripping the tags and unescaping yields the input.

use super::codegen::{CodeGenerator, TokenClass, TokenWriter};
use super::tree::Tree;
use crate::render::escape_html;

impl TokenClass {
    /// CSS 类名；Plain 不加标签
    pub fn css_class(self) -> Option<&'static str> {
        match self {
            TokenClass::Keyword => Some("tok-keyword"),
            TokenClass::Name => Some("tok-name"),
            TokenClass::String => Some("tok-string"),
            TokenClass::Number => Some("tok-number"),
            TokenClass::Comment => Some("tok-comment"),
            TokenClass::Operator => Some("tok-operator"),
            TokenClass::Plain => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct HtmlWriter {
    out: String,
}

impl HtmlWriter {
    pub fn finish(self) -> String {
        self.out
    }
}

impl TokenWriter for HtmlWriter {
    fn write(&mut self, class: TokenClass, text: &str) {
        if text.is_empty() {
            return;
        }
        match class.css_class() {
            Some(css) => {
                self.out.push_str("<span class=\"");
                self.out.push_str(css);
                self.out.push_str("\">");
                self.out.push_str(&escape_html(text));
                self.out.push_str("</span>");
            }
            None => self.out.push_str(&escape_html(text)),
        }
    }
}

/// 按 token 类别着色的源码 HTML
pub fn highlight_html(tree: &Tree) -> String {
    let body = CodeGenerator::with_writer(tree, HtmlWriter::default())
        .generate()
        .finish();
    format!("<pre class=\"cst-code\">{}</pre>", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::parser::parse_module;

    fn highlight(source: &str) -> String {
        highlight_html(&parse_module(source).unwrap())
    }

    /// 去掉标签并反转义
    fn strip(html: &str) -> String {
        let mut text = String::new();
        let mut in_tag = false;
        for c in html.chars() {
            match c {
                '<' => in_tag = true,
                '>' if in_tag => in_tag = false,
                c if !in_tag => text.push(c),
                _ => {}
            }
        }
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    #[test]
    fn test_token_spans() {
        let html = highlight("def f(a=1):\n    return None  # done\n");
        assert!(html.starts_with("<pre class=\"cst-code\"><span class=\"tok-keyword\">def</span> "));
        assert!(html.contains("<span class=\"tok-name\">f</span>"));
        assert!(html.contains("<span class=\"tok-operator\">(</span>"));
        assert!(html.contains("<span class=\"tok-number\">1</span>"));
        assert!(html.contains("<span class=\"tok-keyword\">return</span>"));
        assert!(html.contains("<span class=\"tok-keyword\">None</span>"));
        assert!(html.contains("<span class=\"tok-comment\"># done</span>\n"));
        assert!(html.ends_with("</pre>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let html = highlight("x = a < b & \"<tag>\"\n");
        assert!(html.contains("<span class=\"tok-operator\">&lt;</span>"));
        assert!(html.contains("<span class=\"tok-operator\">&amp;</span>"));
        assert!(html.contains("<span class=\"tok-string\">&quot;&lt;tag&gt;&quot;</span>"));
        assert!(!html.contains("<tag>"));
    }

    #[test]
    fn test_stripped_html_is_the_source() {
        let source = "@dec\nclass A(B):\n    s = 'it''s' if x >= 1 else [y for y in z]  # <c>\n\n    pass\n";
        let html = highlight(source);
        let inner = html
            .strip_prefix("<pre class=\"cst-code\">")
            .and_then(|html| html.strip_suffix("</pre>"))
            .unwrap();
        assert_eq!(strip(inner), source);
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(highlight(""), "<pre class=\"cst-code\"></pre>");
    }
}
