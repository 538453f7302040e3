use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::codec::{CodecError, KeyPair};

const HMAC_HASH_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const AES_256_KEY_LEN: usize = 32;

/// One key pair turned into a signer and, optionally, a cipher.
pub(crate) struct SecureCodec {
    secret: Hmac<Sha256>,
    cipher: Option<Aes256Gcm>,
}

impl SecureCodec {
    pub fn new(pair: &KeyPair) -> Result<Self, CodecError> {
        if pair.hash_key.is_empty() {
            return Err(CodecError::InvalidKey("hash key is empty"));
        }

        let secret = <Hmac<Sha256> as Mac>::new_from_slice(&pair.hash_key)
            .map_err(|_| CodecError::InvalidKey("hash key rejected by hmac"))?;

        let cipher = match &pair.block_key {
            Some(key) if key.len() != AES_256_KEY_LEN => {
                return Err(CodecError::InvalidKey("block key must be 32 bytes"));
            }
            Some(key) => Some(
                Aes256Gcm::new_from_slice(key)
                    .map_err(|_| CodecError::InvalidKey("block key rejected by aes-gcm"))?,
            ),
            None => None,
        };

        Ok(Self { secret, cipher })
    }

    pub fn encode(&self, name: &str, plain: &[u8], now: u64) -> Result<String, CodecError> {
        let payload = self.seal(name, plain)?;

        let mut data = format!("{now}|{}", BASE64_URL_SAFE_NO_PAD.encode(payload)).into_bytes();
        let signature = self.sign(name, &data);

        // put the signature at the end of the payload
        data.push(b'|');
        data.extend_from_slice(&signature);

        Ok(BASE64_URL_SAFE_NO_PAD.encode(data))
    }

    pub fn decode(
        &self,
        name: &str,
        token: &str,
        now: u64,
        max_age: i64,
    ) -> Result<Vec<u8>, CodecError> {
        let decoded = BASE64_URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CodecError::Malformed("token is not base64"))?;

        let signed = self.verify_signature(name, &decoded)?;

        let Some(split) = signed.iter().position(|b| *b == b'|') else {
            return Err(CodecError::Malformed("timestamp separator missing"));
        };
        let (timestamp, body) = (&signed[..split], &signed[split + 1..]);

        let issued: u64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|t| t.parse().ok())
            .ok_or(CodecError::Malformed("timestamp is not a number"))?;

        if max_age > 0 && issued.saturating_add(max_age.unsigned_abs()) < now {
            return Err(CodecError::Expired);
        }

        let payload = BASE64_URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| CodecError::Malformed("payload is not base64"))?;

        self.open(name, payload)
    }

    fn sign(&self, name: &str, data: &[u8]) -> [u8; HMAC_HASH_LEN] {
        let mut hmac = self.secret.clone();
        hmac.update(name.as_bytes());
        hmac.update(b"|");
        hmac.update(data);

        let mut signature = [0u8; HMAC_HASH_LEN];
        signature.copy_from_slice(&hmac.finalize().into_bytes());
        signature
    }

    fn verify_signature<'a>(&self, name: &str, data: &'a [u8]) -> Result<&'a [u8], CodecError> {
        if data.len() < HMAC_HASH_LEN + 1 {
            return Err(CodecError::Malformed("token too short"));
        }

        let (signed, received_signature) = data.split_at(data.len() - HMAC_HASH_LEN);
        let Some(signed) = signed.strip_suffix(b"|") else {
            return Err(CodecError::Malformed("signature separator missing"));
        };

        let signature = self.sign(name, signed);

        if bool::from(received_signature.ct_eq(&signature[..])) {
            Ok(signed)
        } else {
            Err(CodecError::InvalidSignature)
        }
    }

    fn seal(&self, name: &str, plain: &[u8]) -> Result<Vec<u8>, CodecError> {
        let Some(cipher) = &self.cipher else {
            return Ok(plain.to_vec());
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plain,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|_| CodecError::Encryption)?;

        // [nonce (12 bytes)][ciphertext]
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, name: &str, payload: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let Some(cipher) = &self.cipher else {
            return Ok(payload);
        };

        if payload.len() < NONCE_LEN {
            return Err(CodecError::Malformed("encrypted payload too short"));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|_| CodecError::Decryption)
    }
}
