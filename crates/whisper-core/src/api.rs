//! JSON bodies exchanged between `whisper-node` and [`HttpLedgerClient`].
//!
//! Addresses travel hex-encoded.
//!
//! [`HttpLedgerClient`]: crate::http_ledger::HttpLedgerClient

use serde::{Deserialize, Serialize};

use whisper_proto::{Address, OperationKind};

use crate::errors::LedgerError;
use crate::ledger::Receipt;

/// Largest number of addresses accepted in one batch read.
pub const MAX_BATCH_ADDRESSES: usize = 256;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiptBody {
    pub operation: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    pub sequence: u64,
}

impl From<&Receipt> for ReceiptBody {
    fn from(receipt: &Receipt) -> Self {
        Self {
            operation: receipt.kind.name().to_string(),
            address: receipt.address.to_hex(),
            index: receipt.index,
            sequence: receipt.sequence,
        }
    }
}

impl TryFrom<ReceiptBody> for Receipt {
    type Error = String;

    fn try_from(body: ReceiptBody) -> Result<Self, Self::Error> {
        let kind = OperationKind::from_name(&body.operation)
            .ok_or_else(|| format!("unknown operation {:?}", body.operation))?;
        Ok(Self {
            kind,
            address: Address::from_hex(&body.address).map_err(|e| e.to_string())?,
            index: body.index,
            sequence: body.sequence,
        })
    }
}

/// Error body returned with every non-2xx response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_nonce: Option<u64>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            address: None,
            expected_index: None,
            expected_address: None,
            reason: None,
            nonce: None,
            last_nonce: None,
        }
    }

    /// Rebuild the ledger rejection this body describes.
    ///
    /// Returns `None` for codes that do not correspond to a ledger-state
    /// rejection (malformed submissions, storage failures, unknown codes) and
    /// for bodies missing the fields the rejection needs.
    pub fn to_ledger_error(&self) -> Option<LedgerError> {
        let address = Address::from_hex(self.address.as_deref()?).ok()?;
        let reason = || self.reason.clone().unwrap_or_else(|| self.message.clone());

        let err = match self.code.as_str() {
            "already_exists" => LedgerError::AlreadyExists { address },
            "unauthorized" => LedgerError::Unauthorized {
                address,
                reason: reason(),
            },
            "not_found" => LedgerError::NotFound { address },
            "out_of_order" => LedgerError::OutOfOrder {
                expected_index: self.expected_index?,
                expected_address: Address::from_hex(self.expected_address.as_deref()?).ok()?,
                attempted: address,
            },
            "conflict" => LedgerError::Conflict { address },
            "replayed" => LedgerError::Replayed {
                address,
                nonce: self.nonce?,
                last_nonce: self.last_nonce?,
            },
            "invalid_operation" => LedgerError::InvalidOperation {
                address,
                reason: reason(),
            },
            _ => return None,
        };
        Some(err)
    }
}

impl From<&LedgerError> for ErrorBody {
    fn from(err: &LedgerError) -> Self {
        let mut body = Self::new(err.code(), err.to_string());
        body.address = err.address().map(|a| a.to_hex());
        match err {
            LedgerError::OutOfOrder {
                expected_index,
                expected_address,
                ..
            } => {
                body.expected_index = Some(*expected_index);
                body.expected_address = Some(expected_address.to_hex());
            }
            LedgerError::Replayed {
                nonce, last_nonce, ..
            } => {
                body.nonce = Some(*nonce);
                body.last_nonce = Some(*last_nonce);
            }
            LedgerError::Unauthorized { reason, .. } | LedgerError::InvalidOperation { reason, .. } => {
                body.reason = Some(reason.clone());
            }
            _ => {}
        }
        body
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchRequest {
    pub addresses: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResponse {
    pub records: Vec<Option<String>>,
}
