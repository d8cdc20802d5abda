//! Payload framing for the upstream game protocol: MessagePack body,
//! AES-128-CBC with PKCS#7 padding, SHA-256 integrity digest.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::KeySet;
use crate::error::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub struct PayloadCipher {
    key: [u8; 16],
    iv: [u8; 16],
}

impl PayloadCipher {
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    pub fn from_keys(keys: &KeySet) -> Result<Self> {
        Ok(Self::new(keys.key_bytes()?, keys.iv_bytes()?))
    }

    /// Pack and encrypt an outgoing payload.
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<Vec<u8>> {
        let packed = rmp_serde::to_vec_named(payload)?;
        let cipher = Aes128CbcEnc::new(&self.key.into(), &self.iv.into());
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(&packed))
    }

    /// Decrypt and unpack a response body. Garbled ciphertext is fatal, not
    /// swallowed: the error carries enough context to spot a key or version
    /// mismatch.
    pub fn decrypt<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        if bytes.is_empty() || bytes.len() % 16 != 0 {
            return Err(Error::Decryption(format!(
                "ciphertext length {} is not a whole number of AES blocks",
                bytes.len()
            )));
        }
        let cipher = Aes128CbcDec::new(&self.key.into(), &self.iv.into());
        let plain = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(bytes)
            .map_err(|_| {
                Error::Decryption(
                    "bad padding; likely wrong key set or corrupted body".to_string(),
                )
            })?;
        Ok(rmp_serde::from_slice(&plain)?)
    }

    /// Hex SHA-256 of the encrypted body, sent as the integrity header.
    pub fn digest(body: &[u8]) -> String {
        hex::encode(Sha256::digest(body))
    }
}
