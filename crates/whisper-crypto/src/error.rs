/// Errors from the envelope engine, key handling and signature checks.
///
/// `Decryption` and `MalformedPayload` are recoverable per message; `Rng`
/// is fatal to the calling operation.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("decryption failed: authentication tag did not verify")]
    Decryption,
    #[error("encryption failed")]
    Encryption,
    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("RNG failed")]
    Rng,
}
