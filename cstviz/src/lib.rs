pub mod config;
pub mod cst;
pub mod error;
pub mod identifier;
pub mod locator;
pub mod render;
pub mod session;
pub mod span_index;
pub mod viewer;

pub use config::VisualizerConfig;
pub use error::{Error, ParseError, Result};
pub use identifier::{IdentifierTable, NodeId};
pub use locator::nearest_node;
pub use render::{Literal, RenderedField, RenderedNode, RenderedTree, RenderedValue};
pub use session::{render_tree, Session};
pub use span_index::{IndexMode, SpanIndex};
pub use viewer::Visualizer;
