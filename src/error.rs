use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("diagonal [{0}] does not exist")]
    DiagonalNotFound(isize),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("missing rotation key for galois element {0}")]
    MissingRotationKey(usize),

    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("invalid level: level_q={level_q}, level_p={level_p}")]
    InvalidLevel { level_q: usize, level_p: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
