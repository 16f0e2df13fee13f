use std::sync::Arc;
use std::time::Duration;

use whisper_core::client::{ChatClient, ClientConfig, MessageContent, UnreadableReason};
use whisper_core::clock::Clock;
use whisper_core::harness::{paired_clients, LocalNetwork};
use whisper_core::identity::Identity;
use whisper_core::sync::ChatSync;
use whisper_core::{ClientError, LedgerError};
use whisper_crypto::address::derive_message_address;
use whisper_crypto::envelope::max_plaintext_len;

async fn next_nonce(net: &LocalNetwork, identity: &Identity) -> u64 {
    net.ledger.last_nonce(&identity.participant_id()).await.unwrap() + 1
}

#[tokio::test]
async fn alice_and_bob_self_destructing_message() {
    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;

    let hi = alice.send_message(&chat, "hi", None).await.unwrap();
    assert_eq!(hi.index, Some(0));
    assert_eq!(hi.address, derive_message_address(&chat, 0));

    let secret = alice
        .send_message(&chat, "secret", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(secret.index, Some(1));
    assert_eq!(secret.address, derive_message_address(&chat, 1));

    let bob_view = bob.load_chat(&alice.participant_id()).await.unwrap().unwrap();
    assert_eq!(bob_view.messages.len(), 2);
    let first = bob_view.message(0).unwrap();
    assert_eq!(first.content, MessageContent::Text("hi".into()));
    assert_eq!(first.expires_at, 0);
    assert!(!first.is_mine);
    assert_eq!(first.sender, alice.participant_id());
    let second = bob_view.message(1).unwrap();
    assert_eq!(second.content, MessageContent::Text("secret".into()));
    assert_eq!(second.expires_at, net.clock.now() + 60);
    assert!(!second.is_expired);

    let alice_view = alice.load_chat_at(&chat).await.unwrap().unwrap();
    assert!(alice_view.messages.iter().all(|m| m.is_mine));
    assert_eq!(alice_view.message(0).unwrap().content.text(), Some("hi"));
    assert_eq!(alice_view.message(1).unwrap().content.text(), Some("secret"));

    net.advance(61);

    let bob_view = bob.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(bob_view.messages.len(), 2);
    let first = bob_view.message(0).unwrap();
    assert!(!first.is_expired);
    assert_eq!(first.content.text(), Some("hi"));
    assert!(bob_view.message(1).unwrap().is_expired);
    let visible: Vec<_> = bob_view.visible().map(|m| m.index).collect();
    assert_eq!(visible, vec![0]);

    // Expiry is soft: the record is still there until someone deletes it.
    assert!(net.ledger.message(&secret.address).await.unwrap().is_some());

    // The sender lets go of the key once the message has expired.
    let alice_view = alice.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(alice_view.message(0).unwrap().content.text(), Some("hi"));
    assert_eq!(
        alice_view.message(1).unwrap().content,
        MessageContent::Unreadable(UnreadableReason::MissingSentKey)
    );
}

#[tokio::test]
async fn message_without_expiry_never_expires() {
    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;
    bob.send_message(&chat, "forever", None).await.unwrap();

    net.advance(10 * 365 * 24 * 3600);
    let view = alice.load_chat_at(&chat).await.unwrap().unwrap();
    let msg = view.message(0).unwrap();
    assert_eq!(msg.expires_at, 0);
    assert!(!msg.is_expired);
    assert_eq!(msg.content.text(), Some("forever"));
}

#[tokio::test]
async fn indices_are_dense_and_monotonic() {
    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;

    let mut sequences = Vec::new();
    for i in 0..6u64 {
        let sender = if i % 2 == 0 { &alice } else { &bob };
        let receipt = sender.send_message(&chat, &format!("m{i}"), None).await.unwrap();
        assert_eq!(receipt.index, Some(i));
        sequences.push(receipt.sequence);
    }
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    let view = bob.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(view.record.message_count, 6);
    let texts: Vec<_> = view
        .messages
        .iter()
        .map(|m| m.content.text().unwrap().to_string())
        .collect();
    assert_eq!(texts, ["m0", "m1", "m2", "m3", "m4", "m5"]);
}

#[tokio::test]
async fn only_sender_deletes_message() {
    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;
    alice.send_message(&chat, "first", None).await.unwrap();
    alice.send_message(&chat, "second", None).await.unwrap();

    let err = bob.delete_message(&chat, 0).await.unwrap_err();
    assert!(matches!(err.ledger(), Some(LedgerError::Unauthorized { .. })));

    alice.delete_message(&chat, 0).await.unwrap();

    let view = bob.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].index, 1);

    // The freed index is not reused.
    let receipt = bob.send_message(&chat, "third", None).await.unwrap();
    assert_eq!(receipt.index, Some(2));
}

#[tokio::test]
async fn concurrent_sends_for_same_index() {
    use whisper_proto::{Operation, SendMessage};

    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;

    let op = |identity: &Identity, byte: u8, nonce: u64| {
        identity.sign(
            Operation::SendMessage(SendMessage {
                chat,
                message: derive_message_address(&chat, 0),
                ephemeral_public_key: [byte; 32],
                timestamp: whisper_core::harness::GENESIS,
                expires_at: 0,
                payload: vec![byte; 48],
            }),
            nonce,
        )
    };
    let from_alice = op(alice.identity(), 1, next_nonce(&net, alice.identity()).await);
    let from_bob = op(bob.identity(), 2, next_nonce(&net, bob.identity()).await);

    let (a, b) = tokio::join!(net.ledger.submit(&from_alice), net.ledger.submit(&from_bob));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.into_iter().find_map(Result::err).unwrap();
    match loser {
        LedgerError::OutOfOrder { expected_index, .. } => assert_eq!(expected_index, 1),
        other => panic!("unexpected error: {other:?}"),
    }

    let record = net.ledger.chat(&chat).await.unwrap().unwrap();
    assert_eq!(record.message_count, 1);
}

#[tokio::test]
async fn stale_client_gets_out_of_order() {
    use whisper_proto::{Operation, SendMessage};

    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;

    // Bob prepares against count 0, Alice commits first.
    let stale = bob.identity().sign(
        Operation::SendMessage(SendMessage {
            chat,
            message: derive_message_address(&chat, 0),
            ephemeral_public_key: [3u8; 32],
            timestamp: whisper_core::harness::GENESIS,
            expires_at: 0,
            payload: vec![0; 48],
        }),
        next_nonce(&net, bob.identity()).await,
    );
    alice.send_message(&chat, "winner", None).await.unwrap();

    let err = net.ledger.submit(&stale).await.unwrap_err();
    match err {
        LedgerError::OutOfOrder {
            expected_index,
            expected_address,
            attempted,
        } => {
            assert_eq!(expected_index, 1);
            assert_eq!(expected_address, derive_message_address(&chat, 1));
            assert_eq!(attempted, derive_message_address(&chat, 0));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn delete_chat_removes_everything() {
    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;
    for text in ["a", "b", "c"] {
        alice.send_message(&chat, text, None).await.unwrap();
    }
    bob.send_message(&chat, "d", None).await.unwrap();
    assert_eq!(alice.sent_keys().len().await, 3);

    alice.delete_chat(&chat).await.unwrap();
    assert!(alice.sent_keys().is_empty().await);
    assert!(bob.load_chat_at(&chat).await.unwrap().is_none());
    // Only the two signers' nonce records are left.
    assert_eq!(net.store.len().await, 2);

    let err = bob.send_message(&chat, "late", None).await.unwrap_err();
    assert!(matches!(err.ledger(), Some(LedgerError::NotFound { .. })));
}

#[tokio::test]
async fn send_requires_joined_counterparty() {
    let net = LocalNetwork::new();
    let alice = net.client();
    let chat = alice.create_chat().await.unwrap().address;

    let err = alice.send_message(&chat, "anyone?", None).await.unwrap_err();
    assert!(matches!(err, ClientError::CounterpartyNotJoined { .. }));

    let carol = net.client();
    let bob = net.client();
    bob.join_chat(&chat).await.unwrap();

    let err = carol.send_message(&chat, "hello", None).await.unwrap_err();
    assert!(matches!(err, ClientError::NotAParticipant { .. }));

    let err = carol.join_chat(&chat).await.unwrap_err();
    assert!(matches!(err.ledger(), Some(LedgerError::AlreadyExists { .. })));

    // Outsiders can read records but not contents.
    alice.send_message(&chat, "private", None).await.unwrap();
    let view = carol.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(
        view.messages[0].content,
        MessageContent::Unreadable(UnreadableReason::NotAParticipant)
    );
}

#[tokio::test]
async fn oversized_message_rejected_before_submission() {
    let net = LocalNetwork::new();
    let (alice, _bob, chat) = paired_clients(&net).await;
    let max = max_plaintext_len(512);

    let at_limit = "x".repeat(max);
    alice.send_message(&chat, &at_limit, None).await.unwrap();

    let too_long = "x".repeat(max + 1);
    let err = alice.send_message(&chat, &too_long, None).await.unwrap_err();
    assert!(matches!(err, ClientError::PayloadTooLarge { len, .. } if len == max + 1));
    assert_eq!(net.ledger.chat(&chat).await.unwrap().unwrap().message_count, 1);
}

#[tokio::test]
async fn second_device_cannot_read_own_sent_messages() {
    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;
    alice.send_message(&chat, "from laptop", None).await.unwrap();

    let alice_phone = net.client_for(alice.identity().clone());
    let view = alice_phone.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(
        view.messages[0].content,
        MessageContent::Unreadable(UnreadableReason::MissingSentKey)
    );

    let view = bob.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(view.messages[0].content.text(), Some("from laptop"));

    // The phone picks its nonce up from the ledger, not from the laptop.
    alice_phone.send_message(&chat, "from phone", None).await.unwrap();
    alice.send_message(&chat, "laptop again", None).await.unwrap();
    let view = bob.load_chat_at(&chat).await.unwrap().unwrap();
    assert_eq!(view.messages.len(), 3);
}

#[tokio::test]
async fn captured_operations_cannot_resurrect_a_deleted_chat() {
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use whisper_core::ledger::Receipt;
    use whisper_core::ledger_client::LedgerClient;
    use whisper_proto::{Address, SignedOperation};

    /// Passes everything through and keeps a copy of each submission.
    struct Tap {
        inner: Arc<dyn LedgerClient>,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl LedgerClient for Tap {
        async fn submit(&self, op: &SignedOperation) -> Result<Receipt, ClientError> {
            self.seen.lock().await.push(op.encode());
            self.inner.submit(op).await
        }
        async fn fetch(&self, a: &Address) -> Result<Option<Vec<u8>>, ClientError> {
            self.inner.fetch(a).await
        }
        async fn fetch_many(&self, a: &[Address]) -> Result<Vec<Option<Vec<u8>>>, ClientError> {
            self.inner.fetch_many(a).await
        }
    }

    let net = LocalNetwork::new();
    let tap = Arc::new(Tap {
        inner: net.ledger_client(),
        seen: Mutex::new(Vec::new()),
    });
    let client = |identity| ChatClient::new(identity, tap.clone(), net.clock.clone(), ClientConfig::default());
    let alice = client(Identity::generate());
    let bob = client(Identity::generate());

    let chat = alice.create_chat().await.unwrap().address;
    bob.join_chat(&chat).await.unwrap();
    alice.send_message(&chat, "hello", None).await.unwrap();
    alice.delete_chat(&chat).await.unwrap();

    let captured = tap.seen.lock().await.clone();
    assert_eq!(captured.len(), 4);
    for bytes in &captured {
        let err = net.ledger.submit_bytes(bytes).await.unwrap_err();
        assert!(matches!(err, LedgerError::Replayed { .. }), "{err:?}");
    }
    assert!(net.ledger.chat(&chat).await.unwrap().is_none());

    // Recreated chat: replaying the old delete does not touch it.
    alice.create_chat().await.unwrap();
    bob.join_chat(&chat).await.unwrap();
    let err = net.ledger.submit_bytes(&captured[3]).await.unwrap_err();
    assert!(matches!(err, LedgerError::Replayed { .. }));
    assert!(net.ledger.chat(&chat).await.unwrap().is_some());
}

#[tokio::test]
async fn chat_sync_publishes_views() {
    let net = LocalNetwork::new();
    let (alice, bob, chat) = paired_clients(&net).await;
    let bob = Arc::new(bob);

    let sync = Arc::new(ChatSync::new(bob.clone(), chat));
    let mut rx = sync.subscribe();

    let view = sync.refresh().await.unwrap().unwrap();
    assert!(view.messages.is_empty());
    assert!(sync.latest().is_some());

    let handle = sync.clone().spawn(Duration::from_millis(10));
    alice.send_message(&chat, "ping", None).await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            rx.changed().await.unwrap();
            let has_ping = rx
                .borrow_and_update()
                .as_ref()
                .map_or(false, |v| v.messages.iter().any(|m| m.content.text() == Some("ping")));
            if has_ping {
                break;
            }
        }
    })
    .await;
    handle.abort();
    assert!(seen.is_ok(), "sync never published the new message");
}

#[tokio::test]
async fn confirmation_timeout() {
    use async_trait::async_trait;
    use whisper_core::ledger::Receipt;
    use whisper_core::ledger_client::LedgerClient;
    use whisper_proto::{Address, SignedOperation};

    struct Unresponsive;

    #[async_trait]
    impl LedgerClient for Unresponsive {
        async fn submit(&self, _: &SignedOperation) -> Result<Receipt, ClientError> {
            std::future::pending().await
        }
        async fn fetch(&self, _: &Address) -> Result<Option<Vec<u8>>, ClientError> {
            Ok(None)
        }
        async fn fetch_many(&self, a: &[Address]) -> Result<Vec<Option<Vec<u8>>>, ClientError> {
            Ok(vec![None; a.len()])
        }
    }

    let net = LocalNetwork::new();
    let client = ChatClient::new(
        Identity::generate(),
        Arc::new(Unresponsive),
        net.clock.clone(),
        ClientConfig {
            confirm_timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        },
    );

    let err = client.create_chat().await.unwrap_err();
    match err {
        ClientError::ConfirmationTimeout { address } => assert_eq!(address, client.own_chat_address()),
        other => panic!("unexpected error: {other:?}"),
    }
}
