//! Participant identity: an operation signer plus a static X25519 key pair.

use std::fmt;
use std::sync::Arc;

use whisper_crypto::keys::KeyPair;
use whisper_crypto::wallet::{operation_digest, Wallet};
use whisper_proto::{Operation, ParticipantId, SignedOperation};

/// Something that can authorize ledger operations, typically a wallet.
pub trait Signer: Send + Sync {
    fn participant_id(&self) -> ParticipantId;

    /// Ed25519 signature over `message`.
    fn sign(&self, message: &[u8]) -> [u8; 64];
}

impl Signer for Wallet {
    fn participant_id(&self) -> ParticipantId {
        Wallet::participant_id(self)
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        Wallet::sign(self, message)
    }
}

/// Sign `operation` under `nonce` with `signer`, producing the ledger
/// submission form.
pub fn sign_operation(signer: &dyn Signer, operation: Operation, nonce: u64) -> SignedOperation {
    let participant = signer.participant_id();
    let digest = operation_digest(&participant, nonce, &operation.encode());
    SignedOperation {
        signer: participant,
        nonce,
        signature: signer.sign(&digest),
        operation,
    }
}

/// Everything a client needs to act as one participant.
#[derive(Clone)]
pub struct Identity {
    signer: Arc<dyn Signer>,
    static_keys: KeyPair,
}

impl Identity {
    pub fn new(signer: Arc<dyn Signer>, static_keys: KeyPair) -> Self {
        Self {
            signer,
            static_keys,
        }
    }

    /// Fresh wallet and static key pair.
    pub fn generate() -> Self {
        Self::new(Arc::new(Wallet::generate()), KeyPair::generate())
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.signer.participant_id()
    }

    pub fn static_keys(&self) -> &KeyPair {
        &self.static_keys
    }

    pub fn static_public_key(&self) -> [u8; 32] {
        self.static_keys.public_key()
    }

    pub fn sign(&self, operation: Operation, nonce: u64) -> SignedOperation {
        sign_operation(self.signer.as_ref(), operation, nonce)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("participant_id", &self.participant_id())
            .finish_non_exhaustive()
    }
}
