#![cfg(feature = "http-ledger")]

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};

use whisper_proto::{Address, SignedOperation};

use crate::api::{BatchRequest, BatchResponse, ErrorBody, ReceiptBody, MAX_BATCH_ADDRESSES};
use crate::errors::ClientError;
use crate::ledger::Receipt;
use crate::ledger_client::LedgerClient;

/// [`LedgerClient`] speaking to a `whisper-node` over HTTP.
#[derive(Clone)]
pub struct HttpLedgerClient {
    base_url: String,
    client: reqwest::Client,
}

fn transport(e: impl std::fmt::Display) -> ClientError {
    ClientError::Transport(e.to_string())
}

impl HttpLedgerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(transport)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn record_url(&self, address: &Address) -> String {
        format!("{}/v1/records/{}", self.base_url, address.to_hex())
    }

    /// Turn a non-success response into the ledger rejection it carries.
    async fn rejection(resp: Response) -> ClientError {
        let status = resp.status();
        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return transport(e),
        };
        match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(err) => match err.to_ledger_error() {
                Some(ledger) => ClientError::Ledger(ledger),
                None => ClientError::Transport(format!("status={} {}: {}", status, err.code, err.message)),
            },
            Err(_) => ClientError::Transport(format!(
                "status={} body={:?}",
                status,
                String::from_utf8_lossy(&body)
            )),
        }
    }

    async fn fetch_batch(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, ClientError> {
        let request = BatchRequest {
            addresses: addresses.iter().map(Address::to_hex).collect(),
        };
        let resp = self
            .client
            .post(format!("{}/v1/records/batch", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request).map_err(transport)?)
            .send()
            .await
            .map_err(transport)?;

        if resp.status() != StatusCode::OK {
            return Err(Self::rejection(resp).await);
        }
        let body = resp.bytes().await.map_err(transport)?;
        let batch: BatchResponse = serde_json::from_slice(&body).map_err(transport)?;
        if batch.records.len() != addresses.len() {
            return Err(ClientError::Transport(format!(
                "asked for {} records, got {}",
                addresses.len(),
                batch.records.len()
            )));
        }

        batch
            .records
            .into_iter()
            .map(|record| record.map(|h| hex::decode(h).map_err(transport)).transpose())
            .collect()
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit(&self, operation: &SignedOperation) -> Result<Receipt, ClientError> {
        let resp = self
            .client
            .post(format!("{}/v1/operations", self.base_url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(operation.encode())
            .send()
            .await
            .map_err(transport)?;

        if resp.status() != StatusCode::OK {
            return Err(Self::rejection(resp).await);
        }
        let body = resp.bytes().await.map_err(transport)?;
        let receipt: ReceiptBody = serde_json::from_slice(&body).map_err(transport)?;
        Receipt::try_from(receipt).map_err(ClientError::Transport)
    }

    async fn fetch(&self, address: &Address) -> Result<Option<Vec<u8>>, ClientError> {
        let resp = self
            .client
            .get(self.record_url(address))
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::OK => {
                let b = resp.bytes().await.map_err(transport)?;
                Ok(Some(b.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::rejection(resp).await),
        }
    }

    async fn fetch_many(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, ClientError> {
        let mut out = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(MAX_BATCH_ADDRESSES) {
            out.extend(self.fetch_batch(chunk).await?);
        }
        Ok(out)
    }
}
