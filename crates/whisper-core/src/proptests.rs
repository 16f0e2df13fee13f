#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use proptest::prelude::*;
    use whisper_crypto::address::{derive_message_address, message_addresses};
    use whisper_crypto::wallet::Wallet;
    use whisper_proto::{Operation, SendMessage, SignedOperation};

    use crate::clock::ManualClock;
    use crate::errors::LedgerError;
    use crate::ledger::{Ledger, LedgerConfig};
    use crate::store::InMemoryStore;

    const T0: i64 = 1_700_000_000;

    #[derive(Clone, Debug)]
    enum Step {
        Send { from_bob: bool },
        DeleteMessage { pick: usize },
        Replay { pick: usize },
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => any::<bool>().prop_map(|from_bob| Step::Send { from_bob }),
            1 => any::<usize>().prop_map(|pick| Step::DeleteMessage { pick }),
            1 => any::<usize>().prop_map(|pick| Step::Replay { pick }),
        ]
    }

    struct Party {
        wallet: Wallet,
        nonce: u64,
    }

    impl Party {
        fn new() -> Self {
            Self {
                wallet: Wallet::generate(),
                nonce: 0,
            }
        }

        fn sign(&mut self, operation: Operation) -> SignedOperation {
            self.nonce += 1;
            self.wallet.sign_operation(operation, self.nonce)
        }
    }

    async fn run(steps: Vec<Step>) -> Result<(), TestCaseError> {
        let ledger = Ledger::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(T0)),
            LedgerConfig::default(),
        );
        let mut alice = Party::new();
        let mut bob = Party::new();

        let create = alice.sign(Operation::CreateChat { public_key: [1u8; 32] });
        let chat = ledger.submit(&create).await.unwrap().address;
        let join = bob.sign(Operation::JoinChat { chat, public_key: [2u8; 32] });
        ledger.submit(&join).await.unwrap();

        let mut accepted = vec![create, join];
        let mut senders: Vec<bool> = Vec::new();
        let mut addresses = HashSet::new();
        let mut count = 0u64;
        let mut last_sequence = ledger.store().sequence().await.unwrap();

        for step in steps {
            match step {
                Step::Send { from_bob } => {
                    let party = if from_bob { &mut bob } else { &mut alice };
                    let op = party.sign(Operation::SendMessage(SendMessage {
                        chat,
                        message: derive_message_address(&chat, count),
                        ephemeral_public_key: [3u8; 32],
                        timestamp: T0,
                        expires_at: 0,
                        payload: vec![0u8; 48],
                    }));
                    let receipt = ledger.submit(&op).await.unwrap();
                    prop_assert_eq!(receipt.index, Some(count));
                    prop_assert!(addresses.insert(receipt.address));
                    prop_assert!(receipt.sequence > last_sequence);
                    last_sequence = receipt.sequence;
                    senders.push(from_bob);
                    accepted.push(op);
                    count += 1;
                }
                Step::DeleteMessage { pick } => {
                    if count == 0 {
                        continue;
                    }
                    let index = pick as u64 % count;
                    let party = if senders[index as usize] { &mut bob } else { &mut alice };
                    let op = party.sign(Operation::DeleteMessage {
                        message: derive_message_address(&chat, index),
                        chat,
                    });
                    match ledger.submit(&op).await {
                        Ok(receipt) => {
                            prop_assert_eq!(receipt.index, Some(index));
                            prop_assert!(receipt.sequence > last_sequence);
                            last_sequence = receipt.sequence;
                            accepted.push(op);
                        }
                        Err(LedgerError::NotFound { .. }) => {}
                        Err(e) => prop_assert!(false, "unexpected rejection: {:?}", e),
                    }
                }
                Step::Replay { pick } => {
                    let op = &accepted[pick % accepted.len()];
                    let result = ledger.submit(op).await;
                    prop_assert!(
                        matches!(result, Err(LedgerError::Replayed { .. })),
                        "replay was not rejected: {:?}",
                        result
                    );
                    prop_assert_eq!(ledger.store().sequence().await.unwrap(), last_sequence);
                }
            }

            // Deletes and replays never move the count; sends move it by one.
            let record = ledger.chat(&chat).await.unwrap().unwrap();
            prop_assert_eq!(record.message_count, count);
        }

        let live = ledger.fetch_many(&message_addresses(&chat, count)).await.unwrap();
        for (index, raw) in live.iter().enumerate() {
            if let Some(raw) = raw {
                let message = whisper_proto::MessageRecord::decode(raw).unwrap();
                prop_assert_eq!(message.index, index as u64);
                prop_assert_eq!(message.sender == bob.wallet.participant_id(), senders[index]);
            }
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Random send/delete/replay interleavings keep indices dense and
        // never let a submission apply twice.
        #[test]
        fn test_ledger_sequences(steps in proptest::collection::vec(step(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(run(steps))?;
        }
    }
}
