//! Wire formats for WhisperChain.
//!
//! Everything the ledger stores or accepts is encoded here with a fixed,
//! little-endian binary layout:
//! - `ChatRecord` / `MessageRecord` stored at derived addresses
//! - `Operation` (one discriminator byte + arguments)
//! - `SignerRecord` holding each signer's last accepted nonce
//! - `SignedOperation` (signer + nonce + Ed25519 signature + operation)

#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod limits;
pub mod operation;
pub mod records;
pub mod types;

pub use error::CodecError;
pub use operation::{Operation, OperationKind, SendMessage, SignedOperation};
pub use records::{ChatRecord, MessageRecord, SignerRecord};
pub use types::{Address, ParticipantId};

#[cfg(test)]
mod proptests;
