//! WebAssembly bindings for the CST visualizer.
//!
//! The page owns the editor and the DOM; this crate keeps the parsed session
//! and answers the three questions the page asks: what does the tree look
//! like, which node is under the cursor, and where is the node I clicked.

use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::prelude::*;

use cstviz::{Visualizer, VisualizerConfig};

/// Browser-side visualizer session.
#[wasm_bindgen]
pub struct CstVisualizer {
    inner: Visualizer,
}

#[wasm_bindgen]
impl CstVisualizer {
    /// `config` is an optional `{ indentWidth, compact, indexTrivia }` object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<CstVisualizer, String> {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();
        install_logger();

        let config = if config.is_undefined() || config.is_null() {
            VisualizerConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(|e| e.to_string())?
        };

        Ok(Self {
            inner: Visualizer::new(config),
        })
    }

    /// Parse and render; throws the parse error message on malformed input.
    #[wasm_bindgen(js_name = renderTree)]
    pub fn render_tree(&mut self, source: &str) -> Result<JsValue, String> {
        let rendered = self.inner.text_changed(source).map_err(|e| e.to_string())?;
        serde_wasm_bindgen::to_value(rendered).map_err(|e| e.to_string())
    }

    #[wasm_bindgen(js_name = renderHtml)]
    pub fn render_html(&self) -> Option<String> {
        self.inner.render_html()
    }

    /// Node id under the cursor (line 1-based, column 0-based).
    #[wasm_bindgen(js_name = lookupNodeAt)]
    pub fn lookup_node_at(&self, line: usize, column: usize) -> Option<String> {
        self.inner
            .cursor_moved(line, column)
            .map(|id| id.as_str().to_string())
    }

    /// Source range of a clicked node, or `undefined`.
    #[wasm_bindgen(js_name = resolveSpan)]
    pub fn resolve_span(&self, id: &str) -> Result<JsValue, String> {
        match self.inner.anchor_clicked(id) {
            Some(span) => serde_wasm_bindgen::to_value(&span).map_err(|e| e.to_string()),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Source regenerated from the current tree.
    pub fn code(&self) -> Option<String> {
        self.inner.code()
    }

    /// Regenerated source as highlighted HTML.
    #[wasm_bindgen(js_name = codeHtml)]
    pub fn code_html(&self) -> Option<String> {
        self.inner.code_html()
    }
}

/// `log` 输出到浏览器控制台
struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            Level::Error => web_sys::console::error_1(&message),
            Level::Warn => web_sys::console::warn_1(&message),
            Level::Info => web_sys::console::info_1(&message),
            Level::Debug => web_sys::console::debug_1(&message),
            Level::Trace => web_sys::console::log_1(&message),
        }
    }

    fn flush(&self) {}
}

fn install_logger() {
    // 多个实例共用同一个 logger
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
