//! AES-GCM envelope for snippet content at rest.
//!
//! Output layout is `nonce || ciphertext || tag`. The nonce is 12 random bytes
//! drawn fresh for every call; it is not secret and travels with the data.
//! No associated data is bound.

use aes_gcm::{
    Aes128Gcm, Aes256Gcm, AesGcm,
    aead::{Aead, AeadCore, KeyInit, OsRng, consts::U12, generic_array::GenericArray},
    aes::Aes192,
};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::Error;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Nonce length for every supported key size.
pub const NONCE_SIZE: usize = 12;

enum Cipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// Symmetric encrypt/decrypt of opaque payloads.
///
/// Built once at startup from the configured key and shared by reference.
pub struct Envelope {
    cipher: Cipher,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = match self.cipher {
            Cipher::Aes128(_) => 128,
            Cipher::Aes192(_) => 192,
            Cipher::Aes256(_) => 256,
        };
        f.debug_struct("Envelope").field("key_bits", &bits).finish_non_exhaustive()
    }
}

impl Envelope {
    /// Build an envelope from a base64 (standard alphabet) key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the string is not valid base64 or does not
    /// decode to 16, 24, or 32 bytes.
    pub fn from_base64_key(encoded: &str) -> Result<Self, Error> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Config(format!("encryption key is not valid base64: {e}")))?;
        Self::from_key_bytes(&key)
    }

    /// Build an envelope from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` unless the key is 16, 24, or 32 bytes long.
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, Error> {
        let cipher = match key.len() {
            16 => Cipher::Aes128(Aes128Gcm::new(GenericArray::from_slice(key))),
            24 => Cipher::Aes192(Aes192Gcm::new(GenericArray::from_slice(key))),
            32 => Cipher::Aes256(Aes256Gcm::new(GenericArray::from_slice(key))),
            n => {
                return Err(Error::Config(format!(
                    "encryption key must decode to 16, 24, or 32 bytes, got {n}"
                )));
            }
        };
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` under a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encryption` if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = match &self.cipher {
            Cipher::Aes128(c) => c.encrypt(&nonce, plaintext),
            Cipher::Aes192(c) => c.encrypt(&nonce, plaintext),
            Cipher::Aes256(c) => c.encrypt(&nonce, plaintext),
        }
        .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Split off the nonce and open the remainder.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCiphertext` if `data` is shorter than the nonce
    /// - `Error::AuthenticationFailed` if the tag does not verify
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        if data.len() < NONCE_SIZE {
            return Err(Error::InvalidCiphertext);
        }
        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        let nonce = GenericArray::from_slice(nonce);

        match &self.cipher {
            Cipher::Aes128(c) => c.decrypt(nonce, sealed),
            Cipher::Aes192(c) => c.decrypt(nonce, sealed),
            Cipher::Aes256(c) => c.decrypt(nonce, sealed),
        }
        .map_err(|_| Error::AuthenticationFailed)
    }
}
