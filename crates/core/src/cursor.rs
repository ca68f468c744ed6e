use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;
use crate::hlc::Hlc;

/// Opaque per-show sync position. On the wire it is either the empty
/// string ("from the beginning") or the hex form of an [`Hlc`].
///
/// Ordering treats the beginning as smaller than every timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SyncCursor(Option<Hlc>);

impl SyncCursor {
    pub const BEGINNING: SyncCursor = SyncCursor(None);

    pub fn at(hlc: Hlc) -> Self {
        Self(Some(hlc))
    }

    pub fn hlc(&self) -> Option<Hlc> {
        self.0
    }

    pub fn is_beginning(&self) -> bool {
        self.0.is_none()
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() {
            return Ok(Self::BEGINNING);
        }
        Ok(Self(Some(Hlc::from_hex(s)?)))
    }

    /// Like `parse`, but an unreadable cursor falls back to the beginning.
    /// Re-delivering everything is safe because merges are idempotent.
    pub fn parse_lenient(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::BEGINNING)
    }

    /// Whether a change stamped `updated_at` is newer than this cursor.
    pub fn admits(&self, updated_at: Hlc) -> bool {
        match self.0 {
            None => true,
            Some(since) => updated_at > since,
        }
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => Ok(()),
            Some(hlc) => f.write_str(&hlc.to_hex()),
        }
    }
}

impl Serialize for SyncCursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SyncCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        SyncCursor::parse(&s).map_err(serde::de::Error::custom)
    }
}
