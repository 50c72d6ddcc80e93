//! Per-frame authenticated encryption.
//!
//! Every frame is sealed with AES-GCM under the session key and a fresh
//! random 96-bit nonce. The nonce rides in front of the ciphertext:
//!
//! ```text
//! nonce (12) || ciphertext || tag (16)
//! ```
//!
//! A tag mismatch drops the frame; plaintext is never surfaced partially.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::cipher::consts::U12;
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};

use stream_protocol::{NONCE_SIZE, TAG_SIZE};

use crate::{CryptoError, CryptoResult, SessionKey};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// AEAD cipher bound to one session key. Cheap to share behind an `Arc`;
/// read-only after the handshake.
pub enum FrameCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl FrameCipher {
    /// Build the cipher matching the session key length.
    pub fn new(session: &SessionKey) -> CryptoResult<Self> {
        let key = session.key_bytes();
        match key.len() {
            16 => Ok(Self::Aes128(
                Aes128Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?,
            )),
            24 => Ok(Self::Aes192(
                Aes192Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?,
            )),
            32 => Ok(Self::Aes256(
                Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?,
            )),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    /// Encrypt one frame under a fresh random nonce.
    ///
    /// Returns `nonce || ciphertext || tag`.
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = match self {
            Self::Aes128(cipher) => cipher.encrypt(&nonce, plaintext),
            Self::Aes192(cipher) => cipher.encrypt(&nonce, plaintext),
            Self::Aes256(cipher) => cipher.encrypt(&nonce, plaintext),
        }
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt and verify one frame blob produced by [`seal`](Self::seal).
    pub fn open(&self, blob: &[u8]) -> CryptoResult<Vec<u8>> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::TruncatedFrame {
                expected: NONCE_SIZE + TAG_SIZE,
                actual: blob.len(),
            });
        }

        let nonce = Nonce::from_slice(&blob[..NONCE_SIZE]);
        let ciphertext = &blob[NONCE_SIZE..];

        match self {
            Self::Aes128(cipher) => cipher.decrypt(nonce, ciphertext),
            Self::Aes192(cipher) => cipher.decrypt(nonce, ciphertext),
            Self::Aes256(cipher) => cipher.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CryptoError::Authentication)
    }
}
