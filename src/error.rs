//! Error types.

use thiserror::Error;

/// Everything that can go wrong inside a forward/backward pass.
#[derive(Debug, Error)]
pub enum Error {
    /// Hyperparameters that can never produce a valid update.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A storage or loss combination for which no algorithm exists.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The network produced NaN where a probability was expected.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
    /// A training row that does not fit the input layer.
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("malformed parameters: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    pub(crate) fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
