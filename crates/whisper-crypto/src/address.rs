//! Deterministic record addresses.
//!
//! Any party holding the initiator's identity can locate a chat and every
//! message in it without a directory:
//!
//! ```text
//! chat    = SHA-256(T("whisper_addr_v1") | 1:"chat"    | 2:initiator)
//! message = SHA-256(T("whisper_addr_v1") | 1:"message" | 2:chat | 3:index as u64 LE)
//! signer  = SHA-256(T("whisper_addr_v1") | 1:"signer"  | 2:participant)
//! ```

use whisper_proto::{Address, ParticipantId};

use crate::transcript::Transcript;

const ADDRESS_DOMAIN: &str = "whisper_addr_v1";

mod tags {
    pub const KIND: u32 = 1;
    pub const PARENT: u32 = 2;
    pub const INDEX: u32 = 3;
}

pub fn derive_chat_address(initiator: &ParticipantId) -> Address {
    let mut t = Transcript::new(ADDRESS_DOMAIN);
    t.append_bytes(tags::KIND, b"chat");
    t.append_bytes(tags::PARENT, initiator.as_bytes());
    Address(t.finalize())
}

pub fn derive_message_address(chat: &Address, index: u64) -> Address {
    let mut t = Transcript::new(ADDRESS_DOMAIN);
    t.append_bytes(tags::KIND, b"message");
    t.append_bytes(tags::PARENT, chat.as_bytes());
    t.append_bytes(tags::INDEX, &index.to_le_bytes());
    Address(t.finalize())
}

/// Where the ledger keeps the nonce high-water mark of `signer`.
pub fn derive_signer_address(signer: &ParticipantId) -> Address {
    let mut t = Transcript::new(ADDRESS_DOMAIN);
    t.append_bytes(tags::KIND, b"signer");
    t.append_bytes(tags::PARENT, signer.as_bytes());
    Address(t.finalize())
}

/// Addresses of messages `0..count` in `chat`, in index order.
pub fn message_addresses(chat: &Address, count: u64) -> Vec<Address> {
    (0..count).map(|i| derive_message_address(chat, i)).collect()
}
