use thiserror::Error;

/// Errors raised while decoding records and operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("unknown operation tag {0}")]
    UnknownTag(u8),

    #[error("{0} trailing bytes after encoded value")]
    TrailingBytes(usize),

    #[error("record is not initialized")]
    NotInitialized,

    #[error("payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}
