use std::{
    fmt::{self, Write},
    str::FromStr,
    sync::{
        OnceLock,
        atomic::{AtomicU32, Ordering},
    },
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::utils::utc_now_secs;

const ID_LEN: usize = 12;

/// 12-byte record identifier, written as 24 lowercase hex characters.
///
/// Layout: 4-byte big-endian creation time, 5 random bytes fixed per process
/// and a 3-byte counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId([u8; ID_LEN]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session id")]
pub struct InvalidSessionId;

impl SessionId {
    pub fn new() -> Self {
        static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

        let process = PROCESS_UNIQUE.get_or_init(|| {
            let mut bytes = [0u8; 5];
            rand::rng().fill(&mut bytes[..]);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::random()))
            .fetch_add(1, Ordering::SeqCst);

        // Truncating to 32 bits wraps in 2106, same as every other 12-byte id.
        let timestamp = utc_now_secs() as u32;

        let mut id = [0u8; ID_LEN];
        id[..4].copy_from_slice(&timestamp.to_be_bytes());
        id[4..9].copy_from_slice(process);
        id[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn parse(value: &str) -> Result<Self, InvalidSessionId> {
        if value.len() != ID_LEN * 2 {
            return Err(InvalidSessionId);
        }

        let mut id = [0u8; ID_LEN];
        hex::decode_to_slice(value, &mut id).map_err(|_| InvalidSessionId)?;
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Seconds since the epoch at which the id was minted.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(")?;
        fmt::Display::fmt(self, f)?;
        f.write_char(')')
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = InvalidSessionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.to_hex()
    }
}
