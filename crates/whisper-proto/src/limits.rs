//! Size constants shared by the codec, the ledger and clients.

/// Length of addresses, identities and X25519 public keys.
pub const KEY_SIZE: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_SIZE: usize = 64;

/// Default cap on `MessageRecord.encrypted_payload`, enforced by the ledger.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 512;

/// Hard cap applied while decoding, independent of ledger configuration.
pub const MAX_WIRE_PAYLOAD_LEN: usize = 64 * 1024;

/// Encoded size of a `ChatRecord`.
pub const CHAT_RECORD_LEN: usize = 1 // initialized
    + KEY_SIZE // participant_a
    + KEY_SIZE // participant_b
    + KEY_SIZE // pub_key_a
    + KEY_SIZE // pub_key_b
    + 8 // created_at
    + 8 // message_count
    + 8; // last_message_at

/// Encoded size of a `MessageRecord` without its payload bytes.
pub const MESSAGE_HEADER_LEN: usize = 1 // initialized
    + KEY_SIZE // chat_address
    + KEY_SIZE // sender
    + 8 // index
    + 8 // timestamp
    + 8 // expires_at
    + KEY_SIZE // ephemeral_public_key
    + 4; // payload_len

/// Encoded size of a `MessageRecord` carrying `payload_len` bytes.
pub const fn message_record_len(payload_len: usize) -> usize {
    MESSAGE_HEADER_LEN + payload_len
}

/// Encoded size of a `SignerRecord`.
pub const SIGNER_RECORD_LEN: usize = 1 // initialized
    + KEY_SIZE // signer
    + 8; // last_nonce

/// Bytes of a signed SendMessage submission that are not payload.
pub const SIGNED_SEND_HEADER_LEN: usize = KEY_SIZE // signer
    + 8 // nonce
    + SIGNATURE_SIZE
    + 1 // tag
    + KEY_SIZE // chat
    + KEY_SIZE // message
    + KEY_SIZE // ephemeral_public_key
    + 8 // timestamp
    + 8 // expires_at
    + 4; // payload_len

/// Largest payload limit a ledger may be configured with while a full
/// submission still fits in [`MAX_WIRE_PAYLOAD_LEN`].
pub const MAX_CONFIGURABLE_PAYLOAD_LEN: usize = MAX_WIRE_PAYLOAD_LEN - SIGNED_SEND_HEADER_LEN;
