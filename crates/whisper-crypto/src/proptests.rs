#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::address::{derive_chat_address, derive_message_address};
    use crate::envelope::{decrypt, encrypt};
    use crate::error::CryptoError;
    use crate::keys::{derive_shared_secret, KeyPair, SharedSecret};
    use whisper_proto::{Address, ParticipantId};

    proptest! {
        #[test]
        fn test_chat_address_determinism(id in any::<[u8; 32]>()) {
            let id = ParticipantId(id);
            prop_assert_eq!(derive_chat_address(&id), derive_chat_address(&id));
        }

        #[test]
        fn test_message_address_injective_in_index(chat in any::<[u8; 32]>(), i in any::<u64>(), j in any::<u64>()) {
            prop_assume!(i != j);
            let chat = Address(chat);
            prop_assert_ne!(derive_message_address(&chat, i), derive_message_address(&chat, j));
        }

        #[test]
        fn test_dh_commutativity(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            let a = KeyPair::from_private_bytes(a);
            let b = KeyPair::from_private_bytes(b);
            let ab = derive_shared_secret(&a, &b.public_key()).unwrap();
            let ba = derive_shared_secret(&b, &a.public_key()).unwrap();
            prop_assert_eq!(ab.as_bytes(), ba.as_bytes());
        }

        #[test]
        fn test_encrypt_decrypt(plaintext in ".{0,200}", key in any::<[u8; 32]>()) {
            let secret = SharedSecret::from_bytes(key);
            let payload = encrypt(&plaintext, &secret).unwrap();
            prop_assert_eq!(decrypt(&payload.ciphertext, &payload.iv, &secret).unwrap(), plaintext);
        }

        // Flipping any single bit of the ciphertext or the nonce must be
        // rejected by the tag check, never yield different plaintext.
        #[test]
        fn test_tamper_detection(
            plaintext in ".{1,64}",
            key in any::<[u8; 32]>(),
            bit in any::<usize>(),
            in_iv in any::<bool>(),
        ) {
            let secret = SharedSecret::from_bytes(key);
            let mut payload = encrypt(&plaintext, &secret).unwrap();
            if in_iv {
                let bit = bit % (payload.iv.len() * 8);
                payload.iv[bit / 8] ^= 1 << (bit % 8);
            } else {
                let bit = bit % (payload.ciphertext.len() * 8);
                payload.ciphertext[bit / 8] ^= 1 << (bit % 8);
            }
            prop_assert_eq!(
                decrypt(&payload.ciphertext, &payload.iv, &secret).unwrap_err(),
                CryptoError::Decryption
            );
        }
    }
}
