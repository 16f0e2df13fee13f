//! Client-side handle to a ledger, local or remote.

use std::sync::Arc;

use async_trait::async_trait;

use whisper_proto::{Address, SignedOperation};

use crate::errors::ClientError;
use crate::ledger::{Ledger, Receipt};

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit an operation and wait for it to be committed or rejected.
    async fn submit(&self, operation: &SignedOperation) -> Result<Receipt, ClientError>;

    /// Raw record bytes at `address`.
    async fn fetch(&self, address: &Address) -> Result<Option<Vec<u8>>, ClientError>;

    /// Raw record bytes for each address, in order.
    async fn fetch_many(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, ClientError>;
}

/// Talks to a [`Ledger`] in the same process.
#[derive(Clone)]
pub struct LocalLedgerClient {
    ledger: Arc<Ledger>,
}

impl LocalLedgerClient {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}

#[async_trait]
impl LedgerClient for LocalLedgerClient {
    async fn submit(&self, operation: &SignedOperation) -> Result<Receipt, ClientError> {
        Ok(self.ledger.submit(operation).await?)
    }

    async fn fetch(&self, address: &Address) -> Result<Option<Vec<u8>>, ClientError> {
        Ok(self.ledger.fetch(address).await?)
    }

    async fn fetch_many(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, ClientError> {
        Ok(self.ledger.fetch_many(addresses).await?)
    }
}
