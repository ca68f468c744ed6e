//! Request and response bodies exchanged between the browser-side client
//! and the sync endpoints. Everything is JSON on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::CoreError;
use crate::cursor::SyncCursor;
use crate::field_value::FormName;
use crate::ids::{SessionId, ShowId};
use crate::presence::ActiveUser;

pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    pub show_id: ShowId,
    pub session: SessionId,
    /// Raw cursor text; the server reads it leniently.
    pub since: String,
    pub tab: String,
    /// Empty when nothing is focused.
    #[serde(default)]
    pub focused_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub cursor: SyncCursor,
    pub fields: FieldMap,
    pub active_users: Vec<ActiveUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub show_id: ShowId,
    pub session: SessionId,
    pub tab: String,
    #[serde(default)]
    pub focused_field: String,
    /// Wall-clock ms at which this page session started.
    pub since_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub active_users: Vec<ActiveUser>,
    pub other_saved: bool,
    pub saved_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub show_id: ShowId,
    pub form: FormName,
    pub data: FieldMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Wire encoding of an optional focused field.
pub fn focus_param(field: Option<&str>) -> String {
    field.unwrap_or_default().to_string()
}

pub fn parse_focus(param: &str) -> Option<&str> {
    if param.is_empty() { None } else { Some(param) }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

pub fn from_json<T: DeserializeOwned>(s: &str) -> Result<T, CoreError> {
    serde_json::from_str(s).map_err(|e| CoreError::Serialization(e.to_string()))
}
