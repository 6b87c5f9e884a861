// Error type shared by every transformation, schedule and helper in the crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building, initialising or updating transformations.
#[derive(Debug, Error)]
pub enum Error {
    /// Two parameter trees do not carry the same leaf names.
    #[error("parameter structure mismatch: expected leaves {expected:?}, got {got:?}")]
    StructureMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// A leaf exists in both trees but its shapes differ.
    #[error("shape mismatch for leaf `{name}`: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A transformation received a state that was built by another transformation.
    #[error("`{transform}` cannot update from a `{state}` state")]
    StateMismatch {
        transform: &'static str,
        state: &'static str,
    },

    /// The transformation needs the current parameters but none were passed.
    #[error("`{0}` requires the current parameters")]
    MissingParams(&'static str),

    /// An injected factory asked for a hyperparameter that was never injected.
    #[error("unknown hyperparameter `{0}`")]
    UnknownHyperparam(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Msg(String),
}

impl Error {
    pub fn msg(msg: impl Into<String>) -> Self {
        Error::Msg(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
