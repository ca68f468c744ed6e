use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn physical_now() -> Result<u64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
}

/// A 12-byte Hybrid Logical Clock timestamp: 8 bytes wall_ms (big-endian u64)
/// followed by 4 bytes counter (big-endian u32).
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Hlc {
    wall_ms: u64,
    counter: u32,
}

impl Hlc {
    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn to_bytes(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[..8].copy_from_slice(&self.wall_ms.to_be_bytes());
        buf[8..].copy_from_slice(&self.counter.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 12]) -> Self {
        let mut wall = [0u8; 8];
        let mut counter = [0u8; 4];
        wall.copy_from_slice(&bytes[..8]);
        counter.copy_from_slice(&bytes[8..]);
        Self {
            wall_ms: u64::from_be_bytes(wall),
            counter: u32::from_be_bytes(counter),
        }
    }

    /// Lowercase hex of the 12 bytes. Sorts the same way the timestamp does.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CoreError::InvalidCursor(format!("{s:?}: {e}")))?;
        Ok(Self::from_bytes(&bytes))
    }
}

impl Ord for Hlc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for Hlc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Hlc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hlc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Hlc::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A clock that generates monotonically increasing HLC timestamps.
///
/// The server owns one of these; every save and every cursor it hands out
/// comes from `tick_at`, so two timestamps it issued never compare equal.
pub struct HlcClock {
    wall_ms: u64,
    counter: u32,
}

impl HlcClock {
    pub fn new() -> Self {
        Self {
            wall_ms: 0,
            counter: 0,
        }
    }

    /// Resume after `last`, e.g. the highest cursor found in storage on startup.
    pub fn resume_from(last: Hlc) -> Self {
        Self {
            wall_ms: last.wall_ms,
            counter: last.counter,
        }
    }

    /// Generate the next timestamp using the system clock.
    pub fn tick(&mut self) -> Result<Hlc, CoreError> {
        Ok(self.tick_at(physical_now()?))
    }

    /// Generate the next timestamp given the current physical time.
    /// A physical clock that steps backwards only bumps the counter.
    pub fn tick_at(&mut self, now_ms: u64) -> Hlc {
        let hlc = if now_ms > self.wall_ms {
            Hlc::new(now_ms, 0)
        } else {
            Hlc::new(self.wall_ms, self.counter + 1)
        };

        self.wall_ms = hlc.wall_ms;
        self.counter = hlc.counter;
        hlc
    }

    /// Last issued timestamp, if any.
    pub fn last(&self) -> Option<Hlc> {
        if self.wall_ms == 0 && self.counter == 0 {
            None
        } else {
            Some(Hlc::new(self.wall_ms, self.counter))
        }
    }
}

impl Default for HlcClock {
    fn default() -> Self {
        Self::new()
    }
}
