//! Session key material and the one-time RSA key exchange.
//!
//! The receiver generates a fresh AES key and IV per connection, wraps the
//! key with the sender's RSA public key (PKCS#1 v1.5) and sends both in a
//! single handshake datagram. The sender unwraps with its private key.
//! RSA PEM loading is the caller's concern; this module only consumes
//! parsed key objects.

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use stream_protocol::{ClientHello, HANDSHAKE_IV_SIZE};

use crate::{CryptoError, CryptoResult, VALID_KEY_LENGTHS};

/// Symmetric session material, immutable for the connection's lifetime.
///
/// Key bytes are zeroized on drop. The IV is part of the handshake wire
/// format; frame encryption uses fresh random nonces instead.
pub struct SessionKey {
    key: Zeroizing<Vec<u8>>,
    iv: [u8; HANDSHAKE_IV_SIZE],
}

impl SessionKey {
    /// Generate fresh random material. `key_len` must be 16, 24 or 32.
    pub fn generate(key_len: usize) -> CryptoResult<Self> {
        Self::validate_len(key_len)?;

        let mut key = Zeroizing::new(vec![0u8; key_len]);
        OsRng.fill_bytes(&mut key);

        let mut iv = [0u8; HANDSHAKE_IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        Ok(Self { key, iv })
    }

    /// Reconstruct from unwrapped handshake material.
    pub fn from_parts(key: Vec<u8>, iv: [u8; HANDSHAKE_IV_SIZE]) -> CryptoResult<Self> {
        Self::validate_len(key.len())?;
        Ok(Self {
            key: Zeroizing::new(key),
            iv,
        })
    }

    fn validate_len(len: usize) -> CryptoResult<()> {
        if !VALID_KEY_LENGTHS.contains(&len) {
            return Err(CryptoError::InvalidKeyLength(len));
        }
        Ok(())
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; HANDSHAKE_IV_SIZE] {
        &self.iv
    }
}

/// Wrap a session key for transmission: RSA-encrypt the AES key and
/// attach the cleartext IV.
pub fn wrap_session_key(
    public_key: &RsaPublicKey,
    session: &SessionKey,
) -> CryptoResult<ClientHello> {
    let wrapped_key = public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, session.key_bytes())
        .map_err(|e| CryptoError::HandshakeFailed(format!("RSA encrypt: {e}")))?;

    Ok(ClientHello {
        wrapped_key,
        iv: *session.iv(),
    })
}

/// Unwrap a received handshake into session material.
pub fn unwrap_session_key(
    private_key: &RsaPrivateKey,
    hello: &ClientHello,
) -> CryptoResult<SessionKey> {
    let key = private_key
        .decrypt(Pkcs1v15Encrypt, &hello.wrapped_key)
        .map_err(|e| CryptoError::HandshakeFailed(format!("RSA decrypt: {e}")))?;

    SessionKey::from_parts(key, hello.iv)
}
