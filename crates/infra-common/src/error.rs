//! Error types shared by the infra-common layer

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file could not be read
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration content was invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Queue registry was asked for a name that was never declared
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// Queue registry's receiver was already taken by another caller
    #[error("receiver already taken for queue: {0}")]
    ReceiverTaken(String),

    /// Internal infrastructure failure (e.g. subscriber installation)
    #[error("internal error: {0}")]
    Internal(String),
}
