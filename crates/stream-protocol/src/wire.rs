//! Datagram wire formats, hand-encoded little-endian.
//!
//! ## Frame fragment (24 byte header + payload)
//!
//! ```text
//! timestamp:        f64  (8)  capture time, seconds since epoch
//! sequence:         u32  (4)  increments once per frame, wraps at 32 bits
//! fragment_index:   u32  (4)  position of this fragment within the frame
//! total_fragments:  u32  (4)
//! encrypted_size:   u32  (4)  byte length of the whole encrypted frame
//! data:             [u8]      slice of nonce || ciphertext || tag, <= 1400 bytes
//! ```
//!
//! Every field except `fragment_index` is identical on all fragments of a
//! frame. Datagrams may arrive out of order; the index is what makes
//! reassembly deterministic.
//!
//! ## Handshake datagram (receiver -> sender, sent once)
//!
//! ```text
//! key_len:      u64  (8)       length of the RSA-wrapped session key
//! wrapped_key:  [u8] (key_len)
//! iv:           [u8] (16)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{ProtocolError, ProtocolResult, HANDSHAKE_IV_SIZE, MAX_FRAGMENT_PAYLOAD};

/// Per-frame metadata repeated on every fragment of the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub timestamp: f64,
    pub sequence: u32,
    pub fragment_index: u32,
    pub total_fragments: u32,
    pub encrypted_size: u32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 24;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[12..16].copy_from_slice(&self.fragment_index.to_le_bytes());
        buf[16..20].copy_from_slice(&self.total_fragments.to_le_bytes());
        buf[20..24].copy_from_slice(&self.encrypted_size.to_le_bytes());
        buf
    }

    /// Deserialize from the front of a datagram.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::DatagramTooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            timestamp: f64::from_le_bytes(data[0..8].try_into().unwrap()),
            sequence: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            fragment_index: u32::from_le_bytes(data[12..16].try_into().unwrap()),
            total_fragments: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            encrypted_size: u32::from_le_bytes(data[20..24].try_into().unwrap()),
        })
    }

    /// Age of the frame relative to the local clock, in seconds.
    /// Negative values (clock skew) are clamped to zero.
    pub fn age_secs(&self) -> f64 {
        (unix_timestamp() - self.timestamp).max(0.0)
    }
}

/// Split an encrypted frame into MTU-safe datagrams, each carrying the
/// 24-byte header. `sequence` identifies the frame, not the fragment.
pub fn fragment_frame(timestamp: f64, sequence: u32, encrypted: &[u8]) -> Vec<Bytes> {
    let total_fragments = encrypted.len().div_ceil(MAX_FRAGMENT_PAYLOAD) as u32;

    encrypted
        .chunks(MAX_FRAGMENT_PAYLOAD)
        .enumerate()
        .map(|(index, chunk)| {
            let header = FrameHeader {
                timestamp,
                sequence,
                fragment_index: index as u32,
                total_fragments,
                encrypted_size: encrypted.len() as u32,
            };

            let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + chunk.len());
            buf.put_slice(&header.encode());
            buf.put_slice(chunk);
            buf.freeze()
        })
        .collect()
}

/// Handshake payload carrying the RSA-wrapped session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Session key encrypted with the sender's RSA public key
    pub wrapped_key: Vec<u8>,
    /// Handshake IV, sent in the clear
    pub iv: [u8; HANDSHAKE_IV_SIZE],
}

impl ClientHello {
    /// Serialize to the handshake datagram layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8 + self.wrapped_key.len() + HANDSHAKE_IV_SIZE);
        buf.put_u64_le(self.wrapped_key.len() as u64);
        buf.put_slice(&self.wrapped_key);
        buf.put_slice(&self.iv);
        buf.freeze()
    }

    /// Parse a handshake datagram.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < 8 {
            return Err(ProtocolError::DatagramTooShort {
                expected: 8,
                actual: data.len(),
            });
        }

        // The length field is peer-controlled; checked arithmetic keeps
        // a hostile value from wrapping past the bounds check.
        let key_len = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let expected = usize::try_from(key_len)
            .ok()
            .and_then(|n| n.checked_add(8 + HANDSHAKE_IV_SIZE))
            .ok_or_else(|| {
                ProtocolError::MalformedHandshake(format!("key length {} out of range", key_len))
            })?;
        if data.len() < expected {
            return Err(ProtocolError::MalformedHandshake(format!(
                "got {} bytes, need {}",
                data.len(),
                expected
            )));
        }
        let key_len = key_len as usize;

        let wrapped_key = data[8..8 + key_len].to_vec();
        let mut iv = [0u8; HANDSHAKE_IV_SIZE];
        iv.copy_from_slice(&data[8 + key_len..expected]);

        Ok(Self { wrapped_key, iv })
    }
}

/// Seconds since the Unix epoch as an f64, the timestamp domain of the
/// frame header.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
