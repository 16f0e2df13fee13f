//! Ledger-resident records and their fixed binary layout.
//!
//! ChatRecord:
//! `[initialized:1][participant_a:32][participant_b:32][pub_key_a:32][pub_key_b:32]`
//! `[created_at:8][message_count:8][last_message_at:8]`
//!
//! MessageRecord:
//! `[initialized:1][chat:32][sender:32][index:8][timestamp:8][expires_at:8]`
//! `[ephemeral_public_key:32][payload_len:4][payload:N]`
//!
//! SignerRecord:
//! `[initialized:1][signer:32][last_nonce:8]`
//!
//! All integers are little-endian.

use bytes::BufMut;

use crate::codec::Reader;
use crate::error::CodecError;
use crate::limits::{message_record_len, CHAT_RECORD_LEN, KEY_SIZE, MAX_WIRE_PAYLOAD_LEN, SIGNER_RECORD_LEN};
use crate::types::{Address, ParticipantId};

fn read_initialized(r: &mut Reader<'_>) -> Result<(), CodecError> {
    match r.u8("initialized")? {
        1 => Ok(()),
        _ => Err(CodecError::NotInitialized),
    }
}

/// A two-party chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRecord {
    /// Initiator; the chat address is derived from this identity.
    pub participant_a: ParticipantId,
    /// Second participant, `UNCLAIMED` until someone joins.
    pub participant_b: ParticipantId,
    /// Initiator's static X25519 public key.
    pub pub_key_a: [u8; KEY_SIZE],
    /// Joiner's static X25519 public key, zero until joined.
    pub pub_key_b: [u8; KEY_SIZE],
    pub created_at: i64,
    pub message_count: u64,
    pub last_message_at: i64,
}

impl ChatRecord {
    /// A freshly created chat with only the initiator's slot filled.
    pub fn new(initiator: ParticipantId, initiator_public_key: [u8; KEY_SIZE], created_at: i64) -> Self {
        Self {
            participant_a: initiator,
            participant_b: ParticipantId::UNCLAIMED,
            pub_key_a: initiator_public_key,
            pub_key_b: [0u8; KEY_SIZE],
            created_at,
            message_count: 0,
            last_message_at: 0,
        }
    }

    pub fn is_participant(&self, who: &ParticipantId) -> bool {
        if who.is_unclaimed() {
            return false;
        }
        self.participant_a == *who || self.participant_b == *who
    }

    pub fn has_joined(&self) -> bool {
        !self.participant_b.is_unclaimed()
    }

    /// The other participant and their static public key, as seen by `who`.
    ///
    /// Returns `None` when `who` is not a participant or the other slot has
    /// not been claimed yet.
    pub fn counterparty_of(&self, who: &ParticipantId) -> Option<(ParticipantId, [u8; KEY_SIZE])> {
        if !self.is_participant(who) {
            return None;
        }
        if self.participant_a == *who {
            self.has_joined().then_some((self.participant_b, self.pub_key_b))
        } else {
            Some((self.participant_a, self.pub_key_a))
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CHAT_RECORD_LEN);
        out.put_u8(1);
        out.put_slice(self.participant_a.as_bytes());
        out.put_slice(self.participant_b.as_bytes());
        out.put_slice(&self.pub_key_a);
        out.put_slice(&self.pub_key_b);
        out.put_i64_le(self.created_at);
        out.put_u64_le(self.message_count);
        out.put_i64_le(self.last_message_at);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        read_initialized(&mut r)?;
        let record = Self {
            participant_a: ParticipantId(r.array("participant_a")?),
            participant_b: ParticipantId(r.array("participant_b")?),
            pub_key_a: r.array("pub_key_a")?,
            pub_key_b: r.array("pub_key_b")?,
            created_at: r.i64("created_at")?,
            message_count: r.u64("message_count")?,
            last_message_at: r.i64("last_message_at")?,
        };
        r.finish()?;
        Ok(record)
    }
}

/// One encrypted message inside a chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub chat_address: Address,
    pub sender: ParticipantId,
    /// Position in the chat, assigned from `ChatRecord.message_count`.
    pub index: u64,
    pub timestamp: i64,
    /// Unix seconds after which clients treat the message as expired; 0 = never.
    pub expires_at: i64,
    pub ephemeral_public_key: [u8; KEY_SIZE],
    /// Packed `EncryptedPayload`, opaque to the ledger.
    pub encrypted_payload: Vec<u8>,
}

impl MessageRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && now >= self.expires_at
    }

    pub fn encoded_len(&self) -> usize {
        message_record_len(self.encrypted_payload.len())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.put_u8(1);
        out.put_slice(self.chat_address.as_bytes());
        out.put_slice(self.sender.as_bytes());
        out.put_u64_le(self.index);
        out.put_i64_le(self.timestamp);
        out.put_i64_le(self.expires_at);
        out.put_slice(&self.ephemeral_public_key);
        out.put_u32_le(self.encrypted_payload.len() as u32);
        out.put_slice(&self.encrypted_payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        read_initialized(&mut r)?;
        let record = Self {
            chat_address: Address(r.array("chat_address")?),
            sender: ParticipantId(r.array("sender")?),
            index: r.u64("index")?,
            timestamp: r.i64("timestamp")?,
            expires_at: r.i64("expires_at")?,
            ephemeral_public_key: r.array("ephemeral_public_key")?,
            encrypted_payload: r.prefixed("encrypted_payload", MAX_WIRE_PAYLOAD_LEN)?,
        };
        r.finish()?;
        Ok(record)
    }
}

/// Highest operation nonce the ledger has accepted from one signer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerRecord {
    pub signer: ParticipantId,
    pub last_nonce: u64,
}

impl SignerRecord {
    /// Whether an operation carrying `nonce` may still be applied.
    pub fn accepts(&self, nonce: u64) -> bool {
        nonce > self.last_nonce
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNER_RECORD_LEN);
        out.put_u8(1);
        out.put_slice(self.signer.as_bytes());
        out.put_u64_le(self.last_nonce);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        read_initialized(&mut r)?;
        let record = Self {
            signer: ParticipantId(r.array("signer")?),
            last_nonce: r.u64("last_nonce")?,
        };
        r.finish()?;
        Ok(record)
    }
}
