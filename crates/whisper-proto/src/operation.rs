//! Ledger operations and their wire encoding.
//!
//! Each operation is a discriminator byte followed by its arguments:
//!
//! | tag | operation     | arguments                                                        |
//! |-----|---------------|------------------------------------------------------------------|
//! | 0   | CreateChat    | `public_key:32`                                                  |
//! | 1   | SendMessage   | `chat:32 message:32 ephemeral:32 timestamp:8 expires_at:8 len:4 payload` |
//! | 2   | DeleteChat    | `chat:32`                                                        |
//! | 3   | DeleteMessage | `message:32 chat:32`                                             |
//! | 4   | JoinChat      | `chat:32 public_key:32`                                          |

use std::fmt;

use bytes::BufMut;

use crate::codec::Reader;
use crate::error::CodecError;
use crate::limits::{KEY_SIZE, MAX_WIRE_PAYLOAD_LEN, SIGNATURE_SIZE};
use crate::types::{Address, ParticipantId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationKind {
    CreateChat = 0,
    SendMessage = 1,
    DeleteChat = 2,
    DeleteMessage = 3,
    JoinChat = 4,
}

impl OperationKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateChat => "create_chat",
            Self::SendMessage => "send_message",
            Self::DeleteChat => "delete_chat",
            Self::DeleteMessage => "delete_message",
            Self::JoinChat => "join_chat",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::CreateChat,
            Self::SendMessage,
            Self::DeleteChat,
            Self::DeleteMessage,
            Self::JoinChat,
        ]
        .into_iter()
        .find(|kind| kind.name() == name)
    }
}

impl TryFrom<u8> for OperationKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::CreateChat),
            1 => Ok(Self::SendMessage),
            2 => Ok(Self::DeleteChat),
            3 => Ok(Self::DeleteMessage),
            4 => Ok(Self::JoinChat),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments of a SendMessage operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendMessage {
    pub chat: Address,
    /// Address the sender expects the message to land at. Must equal the
    /// address derived from `(chat, chat.message_count)`.
    pub message: Address,
    pub ephemeral_public_key: [u8; KEY_SIZE],
    pub timestamp: i64,
    pub expires_at: i64,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    CreateChat { public_key: [u8; KEY_SIZE] },
    SendMessage(SendMessage),
    DeleteChat { chat: Address },
    DeleteMessage { message: Address, chat: Address },
    JoinChat { chat: Address, public_key: [u8; KEY_SIZE] },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateChat { .. } => OperationKind::CreateChat,
            Self::SendMessage(_) => OperationKind::SendMessage,
            Self::DeleteChat { .. } => OperationKind::DeleteChat,
            Self::DeleteMessage { .. } => OperationKind::DeleteMessage,
            Self::JoinChat { .. } => OperationKind::JoinChat,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 2 * KEY_SIZE);
        out.put_u8(self.kind().tag());
        match self {
            Self::CreateChat { public_key } => out.put_slice(public_key),
            Self::SendMessage(send) => {
                out.put_slice(send.chat.as_bytes());
                out.put_slice(send.message.as_bytes());
                out.put_slice(&send.ephemeral_public_key);
                out.put_i64_le(send.timestamp);
                out.put_i64_le(send.expires_at);
                out.put_u32_le(send.payload.len() as u32);
                out.put_slice(&send.payload);
            }
            Self::DeleteChat { chat } => out.put_slice(chat.as_bytes()),
            Self::DeleteMessage { message, chat } => {
                out.put_slice(message.as_bytes());
                out.put_slice(chat.as_bytes());
            }
            Self::JoinChat { chat, public_key } => {
                out.put_slice(chat.as_bytes());
                out.put_slice(public_key);
            }
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let op = Self::read(&mut r)?;
        r.finish()?;
        Ok(op)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let kind = OperationKind::try_from(r.u8("tag")?)?;
        let op = match kind {
            OperationKind::CreateChat => Self::CreateChat {
                public_key: r.array("public_key")?,
            },
            OperationKind::SendMessage => Self::SendMessage(SendMessage {
                chat: Address(r.array("chat")?),
                message: Address(r.array("message")?),
                ephemeral_public_key: r.array("ephemeral_public_key")?,
                timestamp: r.i64("timestamp")?,
                expires_at: r.i64("expires_at")?,
                payload: r.prefixed("payload", MAX_WIRE_PAYLOAD_LEN)?,
            }),
            OperationKind::DeleteChat => Self::DeleteChat {
                chat: Address(r.array("chat")?),
            },
            OperationKind::DeleteMessage => Self::DeleteMessage {
                message: Address(r.array("message")?),
                chat: Address(r.array("chat")?),
            },
            OperationKind::JoinChat => Self::JoinChat {
                chat: Address(r.array("chat")?),
                public_key: r.array("public_key")?,
            },
        };
        Ok(op)
    }
}

/// An operation together with the identity that authorizes it.
///
/// Wire layout: `[signer:32][nonce:8][signature:64][operation]`.
///
/// `nonce` must exceed the last nonce the ledger accepted from `signer`, so a
/// captured submission cannot be applied twice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedOperation {
    pub signer: ParticipantId,
    pub nonce: u64,
    pub signature: [u8; SIGNATURE_SIZE],
    pub operation: Operation,
}

impl SignedOperation {
    pub fn encode(&self) -> Vec<u8> {
        let op = self.operation.encode();
        let mut out = Vec::with_capacity(KEY_SIZE + 8 + SIGNATURE_SIZE + op.len());
        out.put_slice(self.signer.as_bytes());
        out.put_u64_le(self.nonce);
        out.put_slice(&self.signature);
        out.put_slice(&op);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let signer = ParticipantId(r.array("signer")?);
        let nonce = r.u64("nonce")?;
        let signature = r.array("signature")?;
        let operation = Operation::read(&mut r)?;
        r.finish()?;
        Ok(Self {
            signer,
            nonce,
            signature,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::SIGNED_SEND_HEADER_LEN;

    fn send() -> Operation {
        Operation::SendMessage(SendMessage {
            chat: Address([1; 32]),
            message: Address([2; 32]),
            ephemeral_public_key: [3; 32],
            timestamp: 1_700_000_000,
            expires_at: 1_700_000_060,
            payload: b"ciphertext".to_vec(),
        })
    }

    #[test]
    fn test_discriminators() {
        assert_eq!(Operation::CreateChat { public_key: [0; 32] }.encode()[0], 0);
        assert_eq!(send().encode()[0], 1);
        assert_eq!(Operation::DeleteChat { chat: Address::ZERO }.encode()[0], 2);
        assert_eq!(
            Operation::DeleteMessage { message: Address::ZERO, chat: Address::ZERO }.encode()[0],
            3
        );
        assert_eq!(
            Operation::JoinChat { chat: Address::ZERO, public_key: [0; 32] }.encode()[0],
            4
        );
    }

    #[test]
    fn test_send_message_layout() {
        let bytes = send().encode();
        assert_eq!(bytes.len(), 1 + 32 * 3 + 8 + 8 + 4 + 10);
        assert_eq!(&bytes[97..105], &1_700_000_000i64.to_le_bytes());
        assert_eq!(&bytes[113..117], &10u32.to_le_bytes());
        assert_eq!(Operation::decode(&bytes).unwrap(), send());
    }

    #[test]
    fn test_kind_names() {
        for tag in 0u8..5 {
            let kind = OperationKind::try_from(tag).unwrap();
            assert_eq!(OperationKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(OperationKind::from_name("transfer"), None);
    }

    #[test]
    fn test_signed_send_header_len() {
        let signed = SignedOperation {
            signer: ParticipantId([7; 32]),
            nonce: 1,
            signature: [8; 64],
            operation: send(),
        };
        assert_eq!(signed.encode().len(), SIGNED_SEND_HEADER_LEN + b"ciphertext".len());
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(Operation::decode(&[9]).unwrap_err(), CodecError::UnknownTag(9));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Operation::DeleteChat { chat: Address([4; 32]) }.encode();
        bytes.push(0);
        assert_eq!(Operation::decode(&bytes).unwrap_err(), CodecError::TrailingBytes(1));
    }

    #[test]
    fn test_signed_operation_round_trip() {
        let signed = SignedOperation {
            signer: ParticipantId([7; 32]),
            nonce: 3,
            signature: [8; 64],
            operation: send(),
        };
        let bytes = signed.encode();
        assert_eq!(&bytes[..32], &[7u8; 32]);
        assert_eq!(&bytes[32..40], &3u64.to_le_bytes());
        assert_eq!(&bytes[40..104], &[8u8; 64]);
        assert_eq!(SignedOperation::decode(&bytes).unwrap(), signed);
    }
}
