//! WhisperChain core: the ledger state machine, record stores, and the
//! client that turns ledger records into decrypted chats.
//!
//! This crate implements:
//! - Record storage with atomic compare-and-set batches
//! - The ledger state machine for chats and messages, with per-signer
//!   replay protection
//! - Ledger transports (in-process and HTTP)
//! - The chat client and polling sync

#![forbid(unsafe_code)]

// State machine
pub mod ledger;

// Client
pub mod client;
pub mod sync;

// Infrastructure
pub mod store;
pub mod clock;
pub mod ledger_client;

// Supporting modules
pub mod api;
pub mod errors;
pub mod identity;
pub mod harness;

// Optional transport implementations
#[cfg(feature = "http-ledger")]
pub mod http_ledger;

// Optional storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use client::{ChatClient, ChatView, ClientConfig, MessageContent, MessageView};
pub use errors::{ClientError, LedgerError};
pub use ledger::{Ledger, LedgerConfig, Receipt};
pub use store::{InMemoryStore, RecordStore};

#[cfg(test)]
mod proptests;
