//! whisper-node: HTTP front end for a WhisperChain ledger
//!
//! Accepts signed operations, applies them to the ledger, and serves raw
//! records to clients.

pub mod api;
pub mod config;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use server::WhisperNode;
