//! Chat client: builds, signs, and submits operations for one participant and
//! reconstructs decrypted chat views from ledger records.
//!
//! Outgoing messages are sealed to the counterparty's static key under a fresh
//! ephemeral key. The ephemeral private key is kept in a [`SentKeyCache`] so
//! the sender can read its own messages back; without the cache entry a sent
//! message is unreadable to its author. Entries leave the cache when the
//! message expires, is deleted, or is pushed out by newer sends.
//!
//! Every submission is signed under a fresh nonce: one above both the
//! ledger's high-water mark for this signer and the last nonce this client
//! used.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use whisper_crypto::address::{
    derive_chat_address, derive_message_address, derive_signer_address, message_addresses,
};
use whisper_crypto::envelope::{max_plaintext_len, open_as_recipient, open_as_sender, seal_for};
use whisper_crypto::keys::KeyPair;
use whisper_crypto::CryptoError;
use whisper_proto::limits::DEFAULT_MAX_PAYLOAD_LEN;
use whisper_proto::{
    Address, ChatRecord, MessageRecord, Operation, ParticipantId, SendMessage, SignedOperation,
    SignerRecord,
};

use crate::clock::Clock;
use crate::errors::{ClientError, LedgerError};
use crate::identity::Identity;
use crate::ledger::Receipt;
use crate::ledger_client::LedgerClient;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// How long to wait for a submission to be confirmed.
    pub confirm_timeout: Duration,
    /// Suggested refresh interval for [`crate::sync::ChatSync`].
    pub poll_interval: Duration,
    /// Encrypted payload limit of the target ledger.
    pub max_payload_len: usize,
    /// Most ephemeral keys kept for reading our own messages back.
    pub max_sent_keys: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            max_sent_keys: DEFAULT_SENT_KEY_CAPACITY,
        }
    }
}

// ============================================================================
// Sent-key cache
// ============================================================================

pub const DEFAULT_SENT_KEY_CAPACITY: usize = 1024;

/// What the sender needs to reopen one of its messages.
pub struct SentKey {
    pub chat: Address,
    pub ephemeral: KeyPair,
    pub recipient_public: [u8; 32],
    /// Expiry of the message, 0 = never.
    pub expires_at: i64,
}

impl SentKey {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && now >= self.expires_at
    }
}

#[derive(Default)]
struct SentKeys {
    // Value is (insertion order, key).
    entries: HashMap<Address, (u64, SentKey)>,
    next_order: u64,
}

/// Ephemeral private keys of messages this client sent, by message address.
///
/// Bounded: keys of expired messages are dropped, and past `capacity` the
/// oldest entry goes first. Key material is zeroized when entries are dropped.
pub struct SentKeyCache {
    capacity: usize,
    inner: Mutex<SentKeys>,
}

impl Default for SentKeyCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SENT_KEY_CAPACITY)
    }
}

impl SentKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(SentKeys::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `key` for `message`, first dropping expired entries as of `now`
    /// and then the oldest ones until there is room.
    pub async fn insert(&self, message: Address, key: SentKey, now: i64) {
        let mut keys = self.inner.lock().await;
        keys.entries.retain(|_, (_, k)| !k.is_expired(now));
        while keys.entries.len() >= self.capacity {
            let oldest = keys
                .entries
                .iter()
                .min_by_key(|(_, (order, _))| *order)
                .map(|(address, _)| *address);
            match oldest {
                Some(address) => {
                    keys.entries.remove(&address);
                }
                None => break,
            }
        }
        let order = keys.next_order;
        keys.next_order += 1;
        keys.entries.insert(message, (order, key));
    }

    /// Ephemeral key and recipient public key for `message`.
    pub async fn get(&self, message: &Address) -> Option<(KeyPair, [u8; 32])> {
        self.inner
            .lock()
            .await
            .entries
            .get(message)
            .map(|(_, k)| (k.ephemeral.clone(), k.recipient_public))
    }

    pub async fn remove(&self, message: &Address) -> bool {
        self.inner.lock().await.entries.remove(message).is_some()
    }

    /// Drop every entry belonging to `chat`. Returns how many were removed.
    pub async fn purge_chat(&self, chat: &Address) -> usize {
        let mut keys = self.inner.lock().await;
        let before = keys.entries.len();
        keys.entries.retain(|_, (_, k)| k.chat != *chat);
        before - keys.entries.len()
    }

    /// Drop keys of messages expired as of `now`.
    pub async fn purge_expired(&self, now: i64) -> usize {
        let mut keys = self.inner.lock().await;
        let before = keys.entries.len();
        keys.entries.retain(|_, (_, k)| !k.is_expired(now));
        before - keys.entries.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

// ============================================================================
// Views
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnreadableReason {
    /// Sent by us, but the ephemeral key is gone (other device, restart).
    MissingSentKey,
    /// We are not a participant, so hold no key for it.
    NotAParticipant,
    /// Record bytes did not decode.
    Malformed(String),
    Crypto(CryptoError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Unreadable(UnreadableReason),
}

impl MessageContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Unreadable(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub address: Address,
    pub index: u64,
    pub sender: ParticipantId,
    pub timestamp: i64,
    pub expires_at: i64,
    /// Expiry as of the view's `loaded_at`.
    pub is_expired: bool,
    pub is_mine: bool,
    pub content: MessageContent,
}

/// A chat as seen by one participant at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatView {
    pub address: Address,
    pub record: ChatRecord,
    /// Live messages in index order; deleted indices are absent.
    pub messages: Vec<MessageView>,
    pub loaded_at: i64,
}

impl ChatView {
    /// Messages that have not expired.
    pub fn visible(&self) -> impl Iterator<Item = &MessageView> {
        self.messages.iter().filter(|m| !m.is_expired)
    }

    pub fn message(&self, index: u64) -> Option<&MessageView> {
        self.messages.iter().find(|m| m.index == index)
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct ChatClient {
    identity: Identity,
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    sent_keys: SentKeyCache,
    last_nonce: Mutex<u64>,
}

impl ChatClient {
    pub fn new(
        identity: Identity,
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        let sent_keys = SentKeyCache::with_capacity(config.max_sent_keys);
        Self {
            identity,
            ledger,
            clock,
            config,
            sent_keys,
            last_nonce: Mutex::new(0),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.identity.participant_id()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn sent_keys(&self) -> &SentKeyCache {
        &self.sent_keys
    }

    /// Address of the chat this participant initiates.
    pub fn own_chat_address(&self) -> Address {
        derive_chat_address(&self.participant_id())
    }

    pub async fn create_chat(&self) -> Result<Receipt, ClientError> {
        let operation = Operation::CreateChat {
            public_key: self.identity.static_public_key(),
        };
        let signed = self.sign(operation).await?;
        let receipt = self.confirm(signed, self.own_chat_address()).await?;
        info!(chat = %hex::encode(receipt.address.as_bytes()), "chat created");
        Ok(receipt)
    }

    pub async fn join_chat(&self, chat: &Address) -> Result<Receipt, ClientError> {
        let operation = Operation::JoinChat {
            chat: *chat,
            public_key: self.identity.static_public_key(),
        };
        let signed = self.sign(operation).await?;
        let receipt = self.confirm(signed, *chat).await?;
        info!(chat = %hex::encode(chat.as_bytes()), "joined chat");
        Ok(receipt)
    }

    /// Encrypt `text` to the counterparty and append it to `chat`.
    ///
    /// `expires_in` sets a soft expiry relative to now.
    pub async fn send_message(
        &self,
        chat: &Address,
        text: &str,
        expires_in: Option<Duration>,
    ) -> Result<Receipt, ClientError> {
        let max = max_plaintext_len(self.config.max_payload_len);
        if text.len() > max {
            return Err(ClientError::PayloadTooLarge { len: text.len(), max });
        }

        let me = self.participant_id();
        let record = self
            .fetch_chat(chat)
            .await?
            .ok_or(LedgerError::NotFound { address: *chat })?;
        if !record.is_participant(&me) {
            return Err(ClientError::NotAParticipant { chat: *chat });
        }
        let (_, recipient_public) = record
            .counterparty_of(&me)
            .ok_or(ClientError::CounterpartyNotJoined { chat: *chat })?;

        let sealed = seal_for(&recipient_public, text)?;

        let now = self.clock.now();
        let expires_at = match expires_in {
            Some(d) => now.saturating_add(i64::try_from(d.as_secs()).unwrap_or(i64::MAX)),
            None => 0,
        };
        let index = record.message_count;
        let message = derive_message_address(chat, index);

        let operation = Operation::SendMessage(SendMessage {
            chat: *chat,
            message,
            ephemeral_public_key: sealed.ephemeral_public_key,
            timestamp: now,
            expires_at,
            payload: sealed.payload,
        });
        let signed = self.sign(operation).await?;

        // Cache before submitting: a timed-out submission may still commit.
        let key = SentKey {
            chat: *chat,
            ephemeral: sealed.ephemeral,
            recipient_public,
            expires_at,
        };
        self.sent_keys.insert(message, key, now).await;

        match self.confirm(signed, message).await {
            Ok(receipt) => {
                info!(
                    chat = %hex::encode(chat.as_bytes()),
                    index,
                    expires_at,
                    "message sent"
                );
                Ok(receipt)
            }
            Err(e @ ClientError::ConfirmationTimeout { .. }) => Err(e),
            Err(e) => {
                self.sent_keys.remove(&message).await;
                Err(e)
            }
        }
    }

    /// Delete `chat` and all of its messages.
    pub async fn delete_chat(&self, chat: &Address) -> Result<Receipt, ClientError> {
        let signed = self.sign(Operation::DeleteChat { chat: *chat }).await?;
        let receipt = self.confirm(signed, *chat).await?;
        let purged = self.sent_keys.purge_chat(chat).await;
        info!(chat = %hex::encode(chat.as_bytes()), purged, "chat deleted");
        Ok(receipt)
    }

    /// Delete the message at `index` in `chat`. Only its sender may do this.
    pub async fn delete_message(&self, chat: &Address, index: u64) -> Result<Receipt, ClientError> {
        let message = derive_message_address(chat, index);
        let signed = self
            .sign(Operation::DeleteMessage {
                message,
                chat: *chat,
            })
            .await?;
        let receipt = self.confirm(signed, message).await?;
        self.sent_keys.remove(&message).await;
        info!(chat = %hex::encode(chat.as_bytes()), index, "message deleted");
        Ok(receipt)
    }

    /// Load the chat initiated by `initiator`.
    pub async fn load_chat(&self, initiator: &ParticipantId) -> Result<Option<ChatView>, ClientError> {
        self.load_chat_at(&derive_chat_address(initiator)).await
    }

    /// Load and decrypt the chat at `address`. `None` if there is no chat.
    pub async fn load_chat_at(&self, address: &Address) -> Result<Option<ChatView>, ClientError> {
        let Some(record) = self.fetch_chat(address).await? else {
            debug!(chat = %hex::encode(address.as_bytes()), "no chat at address");
            return Ok(None);
        };

        let addresses = message_addresses(address, record.message_count);
        let raws = self.ledger.fetch_many(&addresses).await?;
        let now = self.clock.now();
        let me = self.participant_id();
        let dropped = self.sent_keys.purge_expired(now).await;
        if dropped > 0 {
            debug!(dropped, "dropped keys of expired messages");
        }

        let mut messages = Vec::with_capacity(raws.len());
        for (index, (message_address, raw)) in (0u64..).zip(addresses.into_iter().zip(raws)) {
            let Some(raw) = raw else { continue };
            match MessageRecord::decode(&raw) {
                Ok(message) => {
                    let content = self.read(&record, &message_address, &message).await;
                    messages.push(MessageView {
                        address: message_address,
                        index: message.index,
                        sender: message.sender,
                        timestamp: message.timestamp,
                        expires_at: message.expires_at,
                        is_expired: message.is_expired(now),
                        is_mine: message.sender == me,
                        content,
                    });
                }
                Err(e) => {
                    warn!(
                        address = %hex::encode(message_address.as_bytes()),
                        index,
                        error = %e,
                        "undecodable message record"
                    );
                    messages.push(MessageView {
                        address: message_address,
                        index,
                        sender: ParticipantId::UNCLAIMED,
                        timestamp: 0,
                        expires_at: 0,
                        is_expired: false,
                        is_mine: false,
                        content: MessageContent::Unreadable(UnreadableReason::Malformed(e.to_string())),
                    });
                }
            }
        }

        debug!(
            chat = %hex::encode(address.as_bytes()),
            count = record.message_count,
            live = messages.len(),
            "chat loaded"
        );

        Ok(Some(ChatView {
            address: *address,
            record,
            messages,
            loaded_at: now,
        }))
    }

    /// Sign `operation` under the next nonce for this identity.
    async fn sign(&self, operation: Operation) -> Result<SignedOperation, ClientError> {
        let signer_address = derive_signer_address(&self.participant_id());
        let recorded = match self.ledger.fetch(&signer_address).await? {
            Some(raw) => SignerRecord::decode(&raw)?.last_nonce,
            None => 0,
        };

        let mut last = self.last_nonce.lock().await;
        let nonce = (*last).max(recorded).saturating_add(1);
        *last = nonce;
        Ok(self.identity.sign(operation, nonce))
    }

    async fn fetch_chat(&self, address: &Address) -> Result<Option<ChatRecord>, ClientError> {
        match self.ledger.fetch(address).await? {
            Some(raw) => Ok(Some(ChatRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn read(&self, chat: &ChatRecord, address: &Address, message: &MessageRecord) -> MessageContent {
        let me = self.participant_id();
        let opened = if message.sender == me {
            match self.sent_keys.get(address).await {
                Some((ephemeral, recipient_public)) => {
                    open_as_sender(&ephemeral, &recipient_public, &message.encrypted_payload)
                }
                None => return MessageContent::Unreadable(UnreadableReason::MissingSentKey),
            }
        } else if chat.is_participant(&me) {
            open_as_recipient(
                self.identity.static_keys(),
                &message.ephemeral_public_key,
                &message.encrypted_payload,
            )
        } else {
            return MessageContent::Unreadable(UnreadableReason::NotAParticipant);
        };

        match opened {
            Ok(text) => MessageContent::Text(text),
            Err(e) => {
                warn!(
                    address = %hex::encode(address.as_bytes()),
                    index = message.index,
                    error = %e,
                    "message unreadable"
                );
                MessageContent::Unreadable(UnreadableReason::Crypto(e))
            }
        }
    }

    async fn confirm(&self, signed: SignedOperation, address: Address) -> Result<Receipt, ClientError> {
        match tokio::time::timeout(self.config.confirm_timeout, self.ledger.submit(&signed)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = %signed.operation.kind(),
                    address = %hex::encode(address.as_bytes()),
                    timeout_ms = self.config.confirm_timeout.as_millis() as u64,
                    "confirmation timed out"
                );
                Err(ClientError::ConfirmationTimeout { address })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(chat: Address, expires_at: i64) -> SentKey {
        SentKey {
            chat,
            ephemeral: KeyPair::generate(),
            recipient_public: [7u8; 32],
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_sent_key_cache_purge() {
        let cache = SentKeyCache::new();
        let chat_a = Address([1u8; 32]);
        let chat_b = Address([2u8; 32]);
        cache.insert(Address([10u8; 32]), key(chat_a, 0), 0).await;
        cache.insert(Address([11u8; 32]), key(chat_a, 0), 0).await;
        cache.insert(Address([12u8; 32]), key(chat_b, 0), 0).await;

        assert_eq!(cache.purge_chat(&chat_a).await, 2);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&Address([12u8; 32])).await.is_some());
        assert!(cache.get(&Address([10u8; 32])).await.is_none());
    }

    #[tokio::test]
    async fn test_sent_key_cache_evicts_oldest() {
        let cache = SentKeyCache::with_capacity(2);
        let chat = Address([1u8; 32]);
        for i in 0..3u8 {
            cache.insert(Address([10 + i; 32]), key(chat, 0), 0).await;
        }
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&Address([10u8; 32])).await.is_none());
        assert!(cache.get(&Address([11u8; 32])).await.is_some());
        assert!(cache.get(&Address([12u8; 32])).await.is_some());
    }

    #[tokio::test]
    async fn test_sent_key_cache_drops_expired() {
        let cache = SentKeyCache::new();
        let chat = Address([1u8; 32]);
        cache.insert(Address([10u8; 32]), key(chat, 100), 50).await;
        cache.insert(Address([11u8; 32]), key(chat, 0), 50).await;
        cache.insert(Address([12u8; 32]), key(chat, 200), 50).await;

        assert_eq!(cache.purge_expired(99).await, 0);
        assert_eq!(cache.purge_expired(100).await, 1);
        assert!(cache.get(&Address([10u8; 32])).await.is_none());

        // Inserting also sweeps expired entries.
        cache.insert(Address([13u8; 32]), key(chat, 0), 200).await;
        assert!(cache.get(&Address([12u8; 32])).await.is_none());
        assert_eq!(cache.len().await, 2);
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.confirm_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_payload_len, 512);
        assert_eq!(config.max_sent_keys, DEFAULT_SENT_KEY_CAPACITY);
        assert_eq!(SentKeyCache::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_visible_skips_expired() {
        let msg = |index, is_expired| MessageView {
            address: Address([index as u8; 32]),
            index,
            sender: ParticipantId([1u8; 32]),
            timestamp: 0,
            expires_at: 0,
            is_expired,
            is_mine: false,
            content: MessageContent::Text(String::new()),
        };
        let view = ChatView {
            address: Address::ZERO,
            record: ChatRecord::new(ParticipantId([1u8; 32]), [2u8; 32], 0),
            messages: vec![msg(0, true), msg(1, false)],
            loaded_at: 0,
        };
        let visible: Vec<_> = view.visible().map(|m| m.index).collect();
        assert_eq!(visible, vec![1]);
        assert!(view.message(0).is_some());
        assert!(view.message(2).is_none());
    }
}
