//! Ledger state machine.
//!
//! Validates signed operations against the current records and turns each
//! accepted operation into one atomic [`WriteBatch`]. Every batch also raises
//! the signer's nonce high-water mark, so a submission is applied at most
//! once and nothing older than a signer's latest operation can be replayed
//! against a recreated chat. Chats move
//! `NonExistent -> Active -> Deleted`; messages move
//! `NonExistent -> Active -> Deleted`. Expiry is never enforced here, readers
//! decide what an expired message means.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use whisper_crypto::address::{
    derive_chat_address, derive_message_address, derive_signer_address, message_addresses,
};
use whisper_crypto::utils::is_all_zero;
use whisper_crypto::wallet::verify_operation;
use whisper_proto::limits::{DEFAULT_MAX_PAYLOAD_LEN, KEY_SIZE};
use whisper_proto::{
    Address, ChatRecord, MessageRecord, Operation, OperationKind, ParticipantId, SendMessage,
    SignedOperation, SignerRecord,
};

use crate::clock::Clock;
use crate::errors::LedgerError;
use crate::store::{RecordStore, StoreError, WriteBatch};

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Largest accepted encrypted payload, in bytes.
    pub max_payload_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

/// Confirmation of a committed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub kind: OperationKind,
    /// Primary record the operation touched.
    pub address: Address,
    /// Message index for message operations.
    pub index: Option<u64>,
    /// Store commit sequence.
    pub sequence: u64,
}

/// Address an operation is about, used for error context before any record
/// has been read.
pub fn target_address(signer: &ParticipantId, operation: &Operation) -> Address {
    match operation {
        Operation::CreateChat { .. } => derive_chat_address(signer),
        Operation::SendMessage(send) => send.message,
        Operation::DeleteChat { chat } | Operation::JoinChat { chat, .. } => *chat,
        Operation::DeleteMessage { message, .. } => *message,
    }
}

/// A signer's nonce record as read, and the value it takes if the operation
/// commits.
struct NonceClaim {
    address: Address,
    previous: Option<Vec<u8>>,
    next: SignerRecord,
}

impl NonceClaim {
    /// A batch whose first write raises the nonce, so that a lost race with
    /// another submission from the same signer is reported against the
    /// signer record.
    fn batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        let value = self.next.encode();
        match &self.previous {
            Some(raw) => batch.replace(self.address, raw.clone(), value),
            None => batch.create(self.address, value),
        };
        batch
    }
}

pub struct Ledger {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Decode and apply a wire-encoded signed operation.
    pub async fn submit_bytes(&self, bytes: &[u8]) -> Result<Receipt, LedgerError> {
        let signed = SignedOperation::decode(bytes).map_err(|e| {
            warn!(error = %e, len = bytes.len(), "rejected undecodable operation");
            LedgerError::Codec(e)
        })?;
        self.submit(&signed).await
    }

    /// Verify and apply a signed operation.
    pub async fn submit(&self, signed: &SignedOperation) -> Result<Receipt, LedgerError> {
        let kind = signed.operation.kind();
        let target = target_address(&signed.signer, &signed.operation);

        let result = self.verify_and_apply(signed, target).await;

        match &result {
            Ok(receipt) => info!(
                operation = %kind,
                signer = %hex::encode(signed.signer.as_bytes()),
                nonce = signed.nonce,
                address = %hex::encode(receipt.address.as_bytes()),
                index = ?receipt.index,
                sequence = receipt.sequence,
                "operation committed"
            ),
            Err(e) => warn!(
                operation = %kind,
                signer = %hex::encode(signed.signer.as_bytes()),
                nonce = signed.nonce,
                address = %hex::encode(target.as_bytes()),
                code = e.code(),
                error = %e,
                "operation rejected"
            ),
        }
        result
    }

    async fn verify_and_apply(&self, signed: &SignedOperation, target: Address) -> Result<Receipt, LedgerError> {
        verify_operation(signed).map_err(|e| LedgerError::unauthorized(target, e.to_string()))?;
        let claim = self.claim_nonce(&signed.signer, signed.nonce).await?;

        let signer = &signed.signer;
        match &signed.operation {
            Operation::CreateChat { public_key } => self.create_chat(signer, public_key, &claim).await,
            Operation::JoinChat { chat, public_key } => self.join_chat(signer, chat, public_key, &claim).await,
            Operation::SendMessage(send) => self.send_message(signer, send, &claim).await,
            Operation::DeleteChat { chat } => self.delete_chat(signer, chat, &claim).await,
            Operation::DeleteMessage { message, chat } => {
                self.delete_message(signer, message, chat, &claim).await
            }
        }
    }

    /// Last nonce accepted from `signer`, 0 if it never submitted anything.
    pub async fn last_nonce(&self, signer: &ParticipantId) -> Result<u64, LedgerError> {
        match self.store.get(&derive_signer_address(signer)).await? {
            Some(raw) => Ok(SignerRecord::decode(&raw)?.last_nonce),
            None => Ok(0),
        }
    }

    async fn claim_nonce(&self, signer: &ParticipantId, nonce: u64) -> Result<NonceClaim, LedgerError> {
        let address = derive_signer_address(signer);
        let previous = self.store.get(&address).await?;
        let current = match &previous {
            Some(raw) => SignerRecord::decode(raw)?,
            None => SignerRecord {
                signer: *signer,
                last_nonce: 0,
            },
        };
        if !current.accepts(nonce) {
            return Err(LedgerError::Replayed {
                address,
                nonce,
                last_nonce: current.last_nonce,
            });
        }

        Ok(NonceClaim {
            address,
            previous,
            next: SignerRecord {
                signer: *signer,
                last_nonce: nonce,
            },
        })
    }

    /// Commit a batch started from `claim`. A conflict on the signer record
    /// is a replay; any other conflict resolves to `on_conflict`.
    async fn commit(
        &self,
        batch: WriteBatch,
        claim: &NonceClaim,
        on_conflict: impl Future<Output = LedgerError>,
    ) -> Result<u64, LedgerError> {
        match self.store.commit(batch).await {
            Ok(sequence) => Ok(sequence),
            Err(StoreError::Conflict { address }) if address == claim.address => {
                let last_nonce = self.last_nonce(&claim.next.signer).await?;
                Err(LedgerError::Replayed {
                    address,
                    nonce: claim.next.last_nonce,
                    last_nonce,
                })
            }
            Err(StoreError::Conflict { .. }) => Err(on_conflict.await),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn fetch(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError> {
        debug!(address = %hex::encode(address.as_bytes()), "fetch record");
        Ok(self.store.get(address).await?)
    }

    pub async fn fetch_many(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, LedgerError> {
        debug!(count = addresses.len(), "fetch records");
        Ok(self.store.get_many(addresses).await?)
    }

    /// Decoded chat record at `address`.
    pub async fn chat(&self, address: &Address) -> Result<Option<ChatRecord>, LedgerError> {
        Ok(self.load_chat(address).await?.map(|(chat, _)| chat))
    }

    /// Decoded message record at `address`.
    pub async fn message(&self, address: &Address) -> Result<Option<MessageRecord>, LedgerError> {
        match self.store.get(address).await? {
            Some(raw) => Ok(Some(MessageRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn load_chat(&self, address: &Address) -> Result<Option<(ChatRecord, Vec<u8>)>, LedgerError> {
        match self.store.get(address).await? {
            Some(raw) => Ok(Some((ChatRecord::decode(&raw)?, raw))),
            None => Ok(None),
        }
    }

    async fn require_chat(&self, address: &Address) -> Result<(ChatRecord, Vec<u8>), LedgerError> {
        self.load_chat(address)
            .await?
            .ok_or(LedgerError::NotFound { address: *address })
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    async fn create_chat(
        &self,
        initiator: &ParticipantId,
        public_key: &[u8; KEY_SIZE],
        claim: &NonceClaim,
    ) -> Result<Receipt, LedgerError> {
        let address = derive_chat_address(initiator);
        if is_all_zero(public_key) {
            return Err(LedgerError::invalid(address, "public key is all zero"));
        }
        if self.store.get(&address).await?.is_some() {
            return Err(LedgerError::AlreadyExists { address });
        }

        let chat = ChatRecord::new(*initiator, *public_key, self.clock.now());
        let mut batch = claim.batch();
        batch.create(address, chat.encode());

        let sequence = self
            .commit(batch, claim, async { LedgerError::AlreadyExists { address } })
            .await?;

        Ok(Receipt {
            kind: OperationKind::CreateChat,
            address,
            index: None,
            sequence,
        })
    }

    async fn join_chat(
        &self,
        joiner: &ParticipantId,
        address: &Address,
        public_key: &[u8; KEY_SIZE],
        claim: &NonceClaim,
    ) -> Result<Receipt, LedgerError> {
        let (mut chat, raw) = self.require_chat(address).await?;
        if chat.participant_a == *joiner {
            return Err(LedgerError::invalid(*address, "initiator cannot join its own chat"));
        }
        if chat.has_joined() {
            return Err(LedgerError::AlreadyExists { address: *address });
        }
        if is_all_zero(public_key) {
            return Err(LedgerError::invalid(*address, "public key is all zero"));
        }

        chat.participant_b = *joiner;
        chat.pub_key_b = *public_key;

        let mut batch = claim.batch();
        batch.replace(*address, raw, chat.encode());

        let sequence = self
            .commit(batch, claim, async { LedgerError::AlreadyExists { address: *address } })
            .await?;

        Ok(Receipt {
            kind: OperationKind::JoinChat,
            address: *address,
            index: None,
            sequence,
        })
    }

    async fn send_message(
        &self,
        sender: &ParticipantId,
        send: &SendMessage,
        claim: &NonceClaim,
    ) -> Result<Receipt, LedgerError> {
        if send.payload.len() > self.config.max_payload_len {
            return Err(LedgerError::invalid(
                send.message,
                format!(
                    "payload is {} bytes, limit is {}",
                    send.payload.len(),
                    self.config.max_payload_len
                ),
            ));
        }
        if send.expires_at != 0 && send.expires_at < send.timestamp {
            return Err(LedgerError::invalid(
                send.message,
                format!("expires_at {} precedes timestamp {}", send.expires_at, send.timestamp),
            ));
        }

        let (mut chat, raw) = self.require_chat(&send.chat).await?;
        if !chat.is_participant(sender) {
            return Err(LedgerError::unauthorized(send.message, "sender is not a chat participant"));
        }

        let index = chat.message_count;
        let expected = derive_message_address(&send.chat, index);
        if send.message != expected {
            return Err(LedgerError::OutOfOrder {
                expected_index: index,
                expected_address: expected,
                attempted: send.message,
            });
        }
        if self.store.get(&expected).await?.is_some() {
            return Err(LedgerError::AlreadyExists { address: expected });
        }

        let record = MessageRecord {
            chat_address: send.chat,
            sender: *sender,
            index,
            timestamp: send.timestamp,
            expires_at: send.expires_at,
            ephemeral_public_key: send.ephemeral_public_key,
            encrypted_payload: send.payload.clone(),
        };
        chat.message_count = index
            .checked_add(1)
            .ok_or_else(|| LedgerError::invalid(send.chat, "message count overflow"))?;
        chat.last_message_at = send.timestamp;

        let mut batch = claim.batch();
        batch
            .replace(send.chat, raw, chat.encode())
            .create(expected, record.encode());

        let sequence = self
            .commit(batch, claim, self.stale_send(&send.chat, send.message))
            .await?;

        Ok(Receipt {
            kind: OperationKind::SendMessage,
            address: expected,
            index: Some(index),
            sequence,
        })
    }

    /// Rejection for a send that lost a commit race: report where the next
    /// message goes now.
    async fn stale_send(&self, chat: &Address, attempted: Address) -> LedgerError {
        match self.load_chat(chat).await {
            Ok(Some((current, _))) => LedgerError::OutOfOrder {
                expected_index: current.message_count,
                expected_address: derive_message_address(chat, current.message_count),
                attempted,
            },
            Ok(None) => LedgerError::NotFound { address: *chat },
            Err(e) => e,
        }
    }

    async fn delete_chat(
        &self,
        caller: &ParticipantId,
        address: &Address,
        claim: &NonceClaim,
    ) -> Result<Receipt, LedgerError> {
        let (chat, raw) = self.require_chat(address).await?;
        if !chat.is_participant(caller) {
            return Err(LedgerError::unauthorized(*address, "caller is not a chat participant"));
        }

        let mut batch = claim.batch();
        batch.delete(*address, raw);
        for message in message_addresses(address, chat.message_count) {
            batch.delete_if_present(message);
        }

        let sequence = self
            .commit(batch, claim, async { LedgerError::Conflict { address: *address } })
            .await?;

        Ok(Receipt {
            kind: OperationKind::DeleteChat,
            address: *address,
            index: None,
            sequence,
        })
    }

    async fn delete_message(
        &self,
        caller: &ParticipantId,
        address: &Address,
        chat: &Address,
        claim: &NonceClaim,
    ) -> Result<Receipt, LedgerError> {
        let raw = self
            .store
            .get(address)
            .await?
            .ok_or(LedgerError::NotFound { address: *address })?;
        let message = MessageRecord::decode(&raw)?;

        if message.chat_address != *chat {
            return Err(LedgerError::invalid(*address, "message does not belong to this chat"));
        }
        if message.sender != *caller {
            return Err(LedgerError::unauthorized(*address, "only the sender may delete a message"));
        }
        if message.is_expired(self.clock.now()) {
            debug!(address = %hex::encode(address.as_bytes()), "deleting expired message");
        }

        let mut batch = claim.batch();
        batch.delete(*address, raw);

        let sequence = self
            .commit(batch, claim, async { LedgerError::NotFound { address: *address } })
            .await?;

        Ok(Receipt {
            kind: OperationKind::DeleteMessage,
            address: *address,
            index: Some(message.index),
            sequence,
        })
    }
}
