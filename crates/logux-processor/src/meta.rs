use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Processing status carried in action metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaStatus {
    Waiting,
    Processed,
    Error,
}

/// Metadata accompanying every action.
///
/// `id` has the shape `"<sequence> <userId>:<clientId>:<nodeId> <timestamp>"`;
/// see [`Context::from_meta`](crate::Context::from_meta) for how it is read.
/// Keys the processor does not know about are kept in `extra` so they survive
/// a trip to the control endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub id: String,
    pub subprotocol: String,
    pub time: Number,
    pub status: MetaStatus,
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    pub fn new(id: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subprotocol: "1.0.0".to_string(),
            time: Number::from(0),
            status: MetaStatus::Waiting,
            server: server.into(),
            channels: None,
            users: None,
            clients: None,
            nodes: None,
            reasons: None,
            extra: Map::new(),
        }
    }
}

/// Metadata overrides attached to a `resend` command.
///
/// Every field is optional and omitted from the wire when unset, so
/// `PartialMeta::default()` serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subprotocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MetaStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
}

impl PartialMeta {
    /// Resend to the given channels only.
    pub fn channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: Some(channels.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}
