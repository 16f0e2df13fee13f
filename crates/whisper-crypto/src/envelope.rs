//! Message envelopes.
//!
//! Each message is sealed to the recipient's static X25519 key with a fresh
//! ephemeral key pair: `secret = DH(ephemeral_private, recipient_static)`.
//! The recipient recomputes `DH(recipient_private, ephemeral_public)`.
//!
//! The AEAD key is `HKDF-SHA256(ikm = secret, info = "whisper_msg_v1_key")`
//! and the cipher is XChaCha20-Poly1305 with a random 24-byte nonce per call.
//!
//! Packed layout stored on the ledger: `[version:1][nonce:24][ciphertext||tag]`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{derive_shared_secret, KeyPair, SharedSecret};

pub const ENVELOPE_VERSION: u8 = 1;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Bytes added to a plaintext by packing it into an envelope.
pub const ENVELOPE_OVERHEAD: usize = 1 + NONCE_LEN + TAG_LEN;

const MESSAGE_KEY_INFO: &[u8] = b"whisper_msg_v1_key";

/// Largest plaintext (in bytes) that fits a ledger payload cap.
pub const fn max_plaintext_len(max_payload_len: usize) -> usize {
    max_payload_len.saturating_sub(ENVELOPE_OVERHEAD)
}

/// Ciphertext (with tag) and the nonce it was sealed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
}

impl EncryptedPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + NONCE_LEN + self.ciphertext.len());
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        let (&version, rest) = data
            .split_first()
            .ok_or(CryptoError::MalformedPayload("empty envelope"))?;
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::MalformedPayload("unsupported envelope version"));
        }
        if rest.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::MalformedPayload("envelope too short"));
        }
        let (iv, ciphertext) = rest.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(iv);
        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            iv: nonce,
        })
    }
}

fn message_cipher(secret: &SharedSecret) -> Result<XChaCha20Poly1305, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(MESSAGE_KEY_INFO, &mut key[..])
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(XChaCha20Poly1305::new(Key::from_slice(&key[..])))
}

/// Encrypt `plaintext` under `secret` with a fresh random nonce.
pub fn encrypt(plaintext: &str, secret: &SharedSecret) -> Result<EncryptedPayload, CryptoError> {
    let mut iv = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut iv).map_err(|_| CryptoError::Rng)?;

    let cipher = message_cipher(secret)?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| CryptoError::Encryption)?;

    Ok(EncryptedPayload { ciphertext, iv })
}

/// Authenticate and decrypt. Fails with `Decryption` if the tag does not
/// verify, `MalformedPayload` if the inputs are not well formed.
pub fn decrypt(ciphertext: &[u8], iv: &[u8], secret: &SharedSecret) -> Result<String, CryptoError> {
    if iv.len() != NONCE_LEN {
        return Err(CryptoError::MalformedPayload("nonce must be 24 bytes"));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::MalformedPayload("ciphertext shorter than tag"));
    }

    let cipher = message_cipher(secret)?;
    let plaintext = cipher
        .decrypt(XNonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::MalformedPayload("plaintext is not utf-8"))
}

/// Output of [`seal_for`].
#[derive(Debug)]
pub struct SealedMessage {
    /// Published with the message record.
    pub ephemeral_public_key: [u8; 32],
    /// Kept only by the sender, if at all.
    pub ephemeral: KeyPair,
    /// Packed envelope bytes for the ledger.
    pub payload: Vec<u8>,
}

/// Seal `plaintext` to `recipient_public` under a new ephemeral key pair.
pub fn seal_for(recipient_public: &[u8; 32], plaintext: &str) -> Result<SealedMessage, CryptoError> {
    let ephemeral = KeyPair::generate();
    let secret = derive_shared_secret(&ephemeral, recipient_public)?;
    let payload = encrypt(plaintext, &secret)?.to_bytes();
    Ok(SealedMessage {
        ephemeral_public_key: ephemeral.public_key(),
        ephemeral,
        payload,
    })
}

/// Recipient path: `DH(own_static, ephemeral_public)`.
pub fn open_as_recipient(
    own_static: &KeyPair,
    ephemeral_public: &[u8; 32],
    packed: &[u8],
) -> Result<String, CryptoError> {
    let envelope = EncryptedPayload::from_bytes(packed)?;
    let secret = derive_shared_secret(own_static, ephemeral_public)?;
    decrypt(&envelope.ciphertext, &envelope.iv, &secret)
}

/// Sender path: recompute `DH(ephemeral_private, recipient_static)` from a
/// retained ephemeral key.
pub fn open_as_sender(
    ephemeral: &KeyPair,
    recipient_public: &[u8; 32],
    packed: &[u8],
) -> Result<String, CryptoError> {
    let envelope = EncryptedPayload::from_bytes(packed)?;
    let secret = derive_shared_secret(ephemeral, recipient_public)?;
    decrypt(&envelope.ciphertext, &envelope.iv, &secret)
}
