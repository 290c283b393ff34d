//! Error types for flashplay.

use thiserror::Error;

/// Result type alias using flashplay's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for flashplay operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An element failed while opening, processing or closing.
    #[error("element error: {0}")]
    Element(String),

    /// Pipeline-level failure (linking, spawning workers).
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// No element registered under this tag.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Operation not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// Decoder could not parse or decode the input.
    #[error("decode error: {0}")]
    Decode(String),

    /// Output transport failure.
    #[error("output error: {0}")]
    Output(String),

    /// Board or codec control failure.
    #[error("board error: {0}")]
    Board(String),

    /// A blocking operation was interrupted by a stop request.
    #[error("operation aborted by stop request")]
    Aborted,

    /// The channel has no peers left.
    #[error("channel closed")]
    ChannelClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error only reports a cooperative stop.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
