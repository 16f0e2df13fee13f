#![forbid(unsafe_code)]

pub mod error;
pub mod hash;
pub mod transcript;
pub mod utils;

pub mod address;
pub mod envelope;
pub mod keys;
pub mod wallet;

pub use error::CryptoError;

#[cfg(test)]
mod proptests;
