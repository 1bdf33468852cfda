use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// The renderer and the identifier assigner disagree about the tree.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Malformed source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    /// 1-based
    pub line: usize,
    /// 0-based
    pub column: usize,
    pub message: String,
}
