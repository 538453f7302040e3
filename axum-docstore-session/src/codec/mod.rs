mod secure;

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    codec::secure::SecureCodec,
    utils::{Clock, SystemClock},
};

/// Browsers reject cookies larger than this.
pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed: {0}")]
    Malformed(&'static str),
    #[error("token is {len} bytes, the limit is {max}")]
    ValueTooLarge { len: usize, max: usize },
    #[error("could not serialize value: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("could not deserialize value: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("could not encrypt value")]
    Encryption,
    #[error("could not decrypt value")]
    Decryption,
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),
    #[error("no key pairs configured")]
    NoKeys,
}

/// A signing key and an optional AES-256 encryption key.
#[derive(Clone)]
pub struct KeyPair {
    pub(crate) hash_key: Vec<u8>,
    pub(crate) block_key: Option<Vec<u8>>,
}

impl KeyPair {
    /// Signed, not encrypted.
    pub fn new(hash_key: impl Into<Vec<u8>>) -> Self {
        Self {
            hash_key: hash_key.into(),
            block_key: None,
        }
    }

    pub fn encrypted(hash_key: impl Into<Vec<u8>>, block_key: impl Into<Vec<u8>>) -> Self {
        Self {
            hash_key: hash_key.into(),
            block_key: Some(block_key.into()),
        }
    }

    /// 64 random bytes for signing and 32 for encryption.
    pub fn generate() -> Self {
        use rand::Rng;

        let mut hash_key = vec![0u8; 64];
        let mut block_key = vec![0u8; 32];
        rand::rng().fill(&mut hash_key[..]);
        rand::rng().fill(&mut block_key[..]);
        Self::encrypted(hash_key, block_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("hash_key", &"..")
            .field("encrypted", &self.block_key.is_some())
            .finish()
    }
}

/// Ordered list of codecs sharing one max-age.
///
/// Encoding always uses the first key pair. Decoding tries every pair in
/// order, so tokens issued under a rotated-out key keep working for as long as
/// that key stays in the list.
pub struct KeyRing {
    codecs: Box<[SecureCodec]>,
    max_age: AtomicI64,
    max_length: usize,
    clock: Arc<dyn Clock>,
}

impl KeyRing {
    pub fn new(pairs: impl IntoIterator<Item = KeyPair>, max_age: i64) -> Result<Self, CodecError> {
        let codecs = pairs
            .into_iter()
            .map(|pair| SecureCodec::new(&pair))
            .collect::<Result<Box<[_]>, _>>()?;

        if codecs.is_empty() {
            return Err(CodecError::NoKeys);
        }

        Ok(Self {
            codecs,
            max_age: AtomicI64::new(max_age),
            max_length: DEFAULT_MAX_TOKEN_LENGTH,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 0 disables the limit.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn max_age(&self) -> i64 {
        self.max_age.load(Ordering::SeqCst)
    }

    /// Tokens older than `max_age` seconds fail to decode. Non-positive values
    /// disable the check.
    pub fn set_max_age(&self, max_age: i64) {
        self.max_age.store(max_age, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<String, CodecError> {
        self.encode_with_limit(name, value, self.max_length)
    }

    pub fn decode<T: DeserializeOwned>(&self, name: &str, token: &str) -> Result<T, CodecError> {
        self.decode_with_limit(name, token, self.max_length)
    }

    /// Record payloads live server-side and are not bound by the token length.
    pub(crate) fn encode_unbounded<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<String, CodecError> {
        self.encode_with_limit(name, value, 0)
    }

    pub(crate) fn decode_unbounded<T: DeserializeOwned>(
        &self,
        name: &str,
        token: &str,
    ) -> Result<T, CodecError> {
        self.decode_with_limit(name, token, 0)
    }

    fn encode_with_limit<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        limit: usize,
    ) -> Result<String, CodecError> {
        let plain = serde_json::to_vec(value).map_err(CodecError::Serialize)?;

        let token = self.codecs[0].encode(name, &plain, self.clock.now_secs())?;
        check_length(&token, limit)?;

        Ok(token)
    }

    fn decode_with_limit<T: DeserializeOwned>(
        &self,
        name: &str,
        token: &str,
        limit: usize,
    ) -> Result<T, CodecError> {
        check_length(token, limit)?;

        let now = self.clock.now_secs();
        let max_age = self.max_age();

        let mut error = CodecError::InvalidSignature;
        for codec in self.codecs.iter() {
            match codec.decode(name, token, now, max_age) {
                Ok(plain) => return serde_json::from_slice(&plain).map_err(CodecError::Deserialize),
                // A signature mismatch only means "not this key", keep looking.
                Err(CodecError::InvalidSignature) => {}
                Err(e) => error = e,
            }
        }

        Err(error)
    }
}

fn check_length(token: &str, limit: usize) -> Result<(), CodecError> {
    if limit != 0 && token.len() > limit {
        return Err(CodecError::ValueTooLarge {
            len: token.len(),
            max: limit,
        });
    }
    Ok(())
}
