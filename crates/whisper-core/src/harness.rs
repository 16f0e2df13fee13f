//! Test harness: an in-process ledger on a manual clock, plus helpers to
//! spin up participants against it.

use std::sync::Arc;

use crate::{
    client::{ChatClient, ClientConfig},
    clock::ManualClock,
    identity::Identity,
    ledger::{Ledger, LedgerConfig},
    ledger_client::{LedgerClient, LocalLedgerClient},
    store::{InMemoryStore, RecordStore},
};

/// Start time used by [`LocalNetwork::new`].
pub const GENESIS: i64 = 1_700_000_000;

/// One ledger, one clock, any number of clients.
pub struct LocalNetwork {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<Ledger>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(GENESIS));
        let ledger = Arc::new(Ledger::new(
            store.clone() as Arc<dyn RecordStore>,
            clock.clone(),
            config,
        ));
        Self { store, clock, ledger }
    }

    pub fn ledger_client(&self) -> Arc<dyn LedgerClient> {
        Arc::new(LocalLedgerClient::new(self.ledger.clone()))
    }

    /// A client with a fresh identity.
    pub fn client(&self) -> ChatClient {
        self.client_for(Identity::generate())
    }

    pub fn client_for(&self, identity: Identity) -> ChatClient {
        ChatClient::new(
            identity,
            self.ledger_client(),
            self.clock.clone(),
            ClientConfig {
                max_payload_len: self.ledger.config().max_payload_len,
                ..ClientConfig::default()
            },
        )
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(secs);
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Alice creates a chat and Bob joins it. Returns `(alice, bob, chat)`.
pub async fn paired_clients(net: &LocalNetwork) -> (ChatClient, ChatClient, whisper_proto::Address) {
    let alice = net.client();
    let bob = net.client();
    let chat = alice.create_chat().await.expect("create chat").address;
    bob.join_chat(&chat).await.expect("join chat");
    (alice, bob, chat)
}
