//! Deterministic transcript hashing.
//!
//! A transcript is a sequence of `(tag, len, bytes)` tuples behind a domain
//! separator, so the same logical fields hash identically in every
//! implementation. Tag and length are u32 big-endian.

use bytes::{BufMut, BytesMut};

use crate::hash::sha256;

#[derive(Clone, Debug, Default)]
pub struct Transcript {
    buf: BytesMut,
}

impl Transcript {
    /// Start a transcript; the domain is recorded under tag 0.
    pub fn new(domain: &'static str) -> Self {
        let mut t = Self { buf: BytesMut::with_capacity(128) };
        t.append_bytes(0, domain.as_bytes());
        t
    }

    pub fn append_bytes(&mut self, tag: u32, data: &[u8]) -> &mut Self {
        self.buf.put_u32(tag);
        self.buf.put_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// SHA-256 of the transcript contents.
    pub fn finalize(&self) -> [u8; 32] {
        sha256(&self.buf)
    }
}
