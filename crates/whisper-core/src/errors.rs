//! Error types for the ledger and the chat client.
//!
//! Ledger rejections carry the address (and index, where one applies) the
//! operation targeted so callers can re-derive state and resubmit.

use thiserror::Error;
use whisper_crypto::CryptoError;
use whisper_proto::{Address, CodecError};

use crate::store::StoreError;

/// Rejections produced by the ledger state machine.
#[derive(Debug, Error, Clone)]
pub enum LedgerError {
    /// The target record already exists or the slot is already claimed.
    #[error("record already exists at {address}")]
    AlreadyExists { address: Address },

    /// The signer may not perform this operation.
    #[error("unauthorized at {address}: {reason}")]
    Unauthorized { address: Address, reason: String },

    /// The referenced chat or message does not exist.
    #[error("no record at {address}")]
    NotFound { address: Address },

    /// The message does not target the chat's next index.
    #[error("out of order: next message index is {expected_index} at {expected_address}, got {attempted}")]
    OutOfOrder {
        expected_index: u64,
        expected_address: Address,
        attempted: Address,
    },

    /// The referenced record changed between read and commit.
    #[error("concurrent modification at {address}")]
    Conflict { address: Address },

    /// The operation's nonce is not above the signer's last accepted nonce:
    /// a replay, or a concurrent submission from the same signer.
    #[error("stale nonce {nonce} at {address}: last accepted is {last_nonce}")]
    Replayed {
        address: Address,
        nonce: u64,
        last_nonce: u64,
    },

    /// Structurally valid but semantically rejected.
    #[error("invalid operation at {address}: {reason}")]
    InvalidOperation { address: Address, reason: String },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Stable machine-readable code, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "already_exists",
            Self::Unauthorized { .. } => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::Conflict { .. } => "conflict",
            Self::Replayed { .. } => "replayed",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::Codec(_) => "malformed_operation",
            Self::Store(_) => "storage",
        }
    }

    /// Address the rejection refers to, if any.
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::AlreadyExists { address }
            | Self::Unauthorized { address, .. }
            | Self::NotFound { address }
            | Self::Conflict { address }
            | Self::Replayed { address, .. }
            | Self::InvalidOperation { address, .. } => Some(*address),
            Self::OutOfOrder { attempted, .. } => Some(*attempted),
            Self::Codec(_) | Self::Store(_) => None,
        }
    }

    pub(crate) fn unauthorized(address: Address, reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            address,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(address: Address, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            address,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by [`crate::client::ChatClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The ledger could not be reached or answered with garbage.
    #[error("transport error: {0}")]
    Transport(String),

    /// No confirmation arrived within the configured window. The operation
    /// may still have been applied.
    #[error("confirmation timed out for {address}")]
    ConfirmationTimeout { address: Address },

    /// The other participant slot is unclaimed, so there is no key to
    /// encrypt to.
    #[error("counterparty has not joined chat {chat}")]
    CounterpartyNotJoined { chat: Address },

    #[error("not a participant of chat {chat}")]
    NotAParticipant { chat: Address },

    #[error("message too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

impl ClientError {
    /// The ledger rejection behind this error, if there is one.
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            Self::Ledger(e) => Some(e),
            _ => None,
        }
    }
}
