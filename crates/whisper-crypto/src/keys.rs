//! X25519 key pairs and Diffie-Hellman shared secrets.
//!
//! Long-term (static) key pairs identify a participant inside a chat and are
//! published in the chat record. Ephemeral key pairs are generated per message
//! and discarded after sending, unless the sender keeps them in a local cache
//! to read its own history.

use std::fmt;

use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::utils::is_all_zero;

/// An X25519 key pair. The private half is zeroized on drop.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from persisted private key bytes.
    pub fn from_private_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Private key bytes for local persistence.
    pub fn private_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// X25519 with `counterparty_public`.
    ///
    /// Rejects low-order public keys, which would force an all-zero secret.
    pub fn diffie_hellman(&self, counterparty_public: &[u8; 32]) -> Result<SharedSecret, CryptoError> {
        let peer = X25519PublicKey::from(*counterparty_public);
        let shared = self.secret.diffie_hellman(&peer);
        let bytes = Zeroizing::new(shared.to_bytes());
        if is_all_zero(&bytes) {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(SharedSecret(bytes))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

/// 32 bytes of DH output. Zeroized on drop.
pub struct SharedSecret(Zeroizing<[u8; 32]>);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// `DH(own_private, counterparty_public)`; identical for both sides of a
/// matched pair of key pairs.
pub fn derive_shared_secret(
    own: &KeyPair,
    counterparty_public: &[u8; 32],
) -> Result<SharedSecret, CryptoError> {
    own.diffie_hellman(counterparty_public)
}
