//! Record storage for the ledger.
//!
//! A store is a flat map from 32-byte addresses to opaque record bytes.
//! Writes go through [`WriteBatch`]: every write carries a precondition on
//! the current value, and a batch is applied all-or-nothing. Each committed
//! batch advances a monotonically increasing sequence number.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use whisper_proto::Address;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// A write's precondition did not hold; nothing was applied.
    #[error("precondition failed at {address}")]
    Conflict { address: Address },

    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),
}

// ============================================================================
// Write Batches
// ============================================================================

/// Expected state of an address at commit time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Nothing is stored at the address.
    Absent,
    /// Exactly these bytes are stored at the address.
    Equals(Vec<u8>),
    /// No check.
    Any,
}

impl Precondition {
    pub fn holds(&self, current: Option<&[u8]>) -> bool {
        match (self, current) {
            (Self::Any, _) => true,
            (Self::Absent, None) => true,
            (Self::Equals(expected), Some(current)) => expected.as_slice() == current,
            _ => false,
        }
    }
}

/// A single conditional write. `value: None` deletes the record.
#[derive(Clone, Debug)]
pub struct Write {
    pub address: Address,
    pub expect: Precondition,
    pub value: Option<Vec<u8>>,
}

/// Writes applied atomically. Addresses within a batch must be distinct.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at an address that must currently be empty.
    pub fn create(&mut self, address: Address, value: Vec<u8>) -> &mut Self {
        self.push(address, Precondition::Absent, Some(value))
    }

    /// Replace `expected` with `value`.
    pub fn replace(&mut self, address: Address, expected: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.push(address, Precondition::Equals(expected), Some(value))
    }

    /// Delete a record that must still hold `expected`.
    pub fn delete(&mut self, address: Address, expected: Vec<u8>) -> &mut Self {
        self.push(address, Precondition::Equals(expected), None)
    }

    /// Delete whatever is stored at `address`, if anything.
    pub fn delete_if_present(&mut self, address: Address) -> &mut Self {
        self.push(address, Precondition::Any, None)
    }

    pub fn push(&mut self, address: Address, expect: Precondition, value: Option<Vec<u8>>) -> &mut Self {
        self.writes.push(Write {
            address,
            expect,
            value,
        });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn check_distinct(&self) -> Result<(), StoreError> {
        let mut seen = HashSet::with_capacity(self.writes.len());
        for write in &self.writes {
            if !seen.insert(write.address) {
                return Err(StoreError::OperationFailed(format!(
                    "address {} appears twice in one batch",
                    write.address
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Store Trait
// ============================================================================

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, StoreError>;

    /// Fetch several records, preserving order. Missing records are `None`.
    async fn get_many(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            out.push(self.get(address).await?);
        }
        Ok(out)
    }

    /// Check every precondition, then apply every write, as one unit.
    ///
    /// Returns the sequence number assigned to the batch.
    async fn commit(&self, batch: WriteBatch) -> Result<u64, StoreError>;

    /// Sequence number of the last committed batch (0 if none).
    async fn sequence(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

#[derive(Default)]
struct MemoryState {
    records: HashMap<Address, Vec<u8>>,
    sequence: u64,
}

/// In-memory store for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.read().await.records.get(address).cloned())
    }

    async fn get_many(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let state = self.state.read().await;
        Ok(addresses
            .iter()
            .map(|address| state.records.get(address).cloned())
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<u64, StoreError> {
        batch.check_distinct()?;

        let mut state = self.state.write().await;
        for write in batch.writes() {
            let current = state.records.get(&write.address).map(Vec::as_slice);
            if !write.expect.holds(current) {
                return Err(StoreError::Conflict {
                    address: write.address,
                });
            }
        }

        for write in batch.writes {
            match write.value {
                Some(value) => {
                    state.records.insert(write.address, value);
                }
                None => {
                    state.records.remove(&write.address);
                }
            }
        }
        state.sequence += 1;
        Ok(state.sequence)
    }

    async fn sequence(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.sequence)
    }
}
