use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action type reserved for channel subscriptions.
pub const SUBSCRIBE_TYPE: &str = "logux/subscribe";

/// A typed action payload. Only `type` is interpreted by the processor; all
/// other fields are carried through untouched for the application hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// How the dispatcher routes an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind<'a> {
    /// A subscribe action. `channel` is `None` when the field is missing or
    /// not a string.
    Subscribe { channel: Option<&'a str> },
    Other,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self::new(SUBSCRIBE_TYPE).with_field("channel", Value::String(channel.into()))
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn is_type(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn classify(&self) -> ActionKind<'_> {
        if self.is_type(SUBSCRIBE_TYPE) {
            ActionKind::Subscribe {
                channel: self.fields.get("channel").and_then(Value::as_str),
            }
        } else {
            ActionKind::Other
        }
    }
}
