#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::operation::{Operation, SignedOperation};
    use crate::records::{ChatRecord, MessageRecord, SignerRecord};
    use crate::types::{Address, ParticipantId};

    proptest! {
        // Decoders must reject garbage with an error, never panic.
        #[test]
        fn test_decoders_never_panic(data in proptest::collection::vec(any::<u8>(), 0..400)) {
            let _ = ChatRecord::decode(&data);
            let _ = MessageRecord::decode(&data);
            let _ = SignerRecord::decode(&data);
            let _ = Operation::decode(&data);
            let _ = SignedOperation::decode(&data);
        }

        #[test]
        fn test_message_record_preserved(
            chat in any::<[u8; 32]>(),
            sender in any::<[u8; 32]>(),
            index in any::<u64>(),
            timestamp in any::<i64>(),
            expires_at in any::<i64>(),
            eph in any::<[u8; 32]>(),
            payload in proptest::collection::vec(any::<u8>(), 0..600),
        ) {
            let record = MessageRecord {
                chat_address: Address(chat),
                sender: ParticipantId(sender),
                index,
                timestamp,
                expires_at,
                ephemeral_public_key: eph,
                encrypted_payload: payload,
            };
            let bytes = record.encode();
            prop_assert_eq!(bytes.len(), record.encoded_len());
            prop_assert_eq!(MessageRecord::decode(&bytes).unwrap(), record);
        }

        // Truncating a valid encoding anywhere must be detected.
        #[test]
        fn test_truncated_chat_rejected(cut in 0usize..153) {
            let chat = ChatRecord::new(ParticipantId([1; 32]), [2; 32], 42);
            let bytes = chat.encode();
            prop_assert!(ChatRecord::decode(&bytes[..cut]).is_err());
        }
    }
}
