//! Ed25519 wallets and operation signatures.
//!
//! A participant's identity on the ledger is its Ed25519 verifying key. Every
//! operation is signed over
//! `SHA-256(T("whisper_op_sig_v1") | 1:signer | 2:nonce as u64 LE | 3:operation_bytes)`.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use whisper_proto::{Operation, ParticipantId, SignedOperation};

use crate::error::CryptoError;
use crate::transcript::Transcript;

const OPERATION_SIG_DOMAIN: &str = "whisper_op_sig_v1";

/// Digest that a signer signs for `operation` submitted by `signer` under `nonce`.
pub fn operation_digest(signer: &ParticipantId, nonce: u64, operation_bytes: &[u8]) -> [u8; 32] {
    let mut t = Transcript::new(OPERATION_SIG_DOMAIN);
    t.append_bytes(1, signer.as_bytes());
    t.append_bytes(2, &nonce.to_le_bytes());
    t.append_bytes(3, operation_bytes);
    t.finalize()
}

/// Local Ed25519 signing key standing in for an external wallet.
pub struct Wallet {
    sign_key: SigningKey,
}

impl Wallet {
    pub fn generate() -> Self {
        Self {
            sign_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            sign_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.sign_key.to_bytes())
    }

    pub fn participant_id(&self) -> ParticipantId {
        ParticipantId(self.sign_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let signature: Signature = self.sign_key.sign(message);
        signature.to_bytes()
    }

    /// Sign `operation` as this wallet. `nonce` must be above the last one
    /// the ledger accepted from this wallet.
    pub fn sign_operation(&self, operation: Operation, nonce: u64) -> SignedOperation {
        let signer = self.participant_id();
        let digest = operation_digest(&signer, nonce, &operation.encode());
        SignedOperation {
            signer,
            nonce,
            signature: self.sign(&digest),
            operation,
        }
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("participant_id", &self.participant_id())
            .finish_non_exhaustive()
    }
}

pub fn verify_signature(
    signer: &ParticipantId,
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let verifying_key =
        VerifyingKey::from_bytes(signer.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = Signature::from_bytes(signature);
    verifying_key
        .verify_strict(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Check that `signed.signer` authorized `signed.operation`.
pub fn verify_operation(signed: &SignedOperation) -> Result<(), CryptoError> {
    let digest = operation_digest(&signed.signer, signed.nonce, &signed.operation.encode());
    verify_signature(&signed.signer, &digest, &signed.signature)
}
