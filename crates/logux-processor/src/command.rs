//! Wire commands exchanged with the Logux server.
//!
//! Every command is a JSON array whose first element is a string tag.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::meta::{Meta, PartialMeta};

pub const AUTH: &str = "auth";
pub const ACTION: &str = "action";
pub const ERROR: &str = "error";
pub const AUTHENTICATED: &str = "authenticated";
/// Tag used by the Logux HTTP protocol for a rejected authentication. The
/// missing `d` is part of the wire format.
pub const DENIED: &str = "enied";
pub const RESEND: &str = "resend";
pub const APPROVED: &str = "approved";
pub const PROCESSED: &str = "processed";
pub const FORBIDDEN: &str = "forbidden";
pub const UNKNOWN_ACTION: &str = "unknownAction";
pub const UNKNOWN_CHANNEL: &str = "unknownChannel";

/// Body of an inbound request from the Logux server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub version: u32,
    pub password: String,
    pub commands: Vec<InputCommand>,
}

/// One element of a request's `commands` array.
///
/// Elements that are neither a well-formed `auth` nor `action` command are
/// kept as `Unknown` instead of failing the whole request, because the
/// dispatcher must still answer the commands that precede them.
#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    Auth {
        user_id: String,
        credentials: String,
        auth_id: String,
    },
    Action(ActionCommand),
    Unknown(Value),
}

impl InputCommand {
    pub fn auth(
        user_id: impl Into<String>,
        credentials: impl Into<String>,
        auth_id: impl Into<String>,
    ) -> Self {
        Self::Auth {
            user_id: user_id.into(),
            credentials: credentials.into(),
            auth_id: auth_id.into(),
        }
    }

    pub fn action(action: Action, meta: Meta) -> Self {
        Self::Action(ActionCommand { action, meta })
    }

    pub fn from_value(value: Value) -> Self {
        let tag = value
            .as_array()
            .and_then(|items| items.first())
            .and_then(Value::as_str);
        let parsed = match tag {
            Some(AUTH) => serde_json::from_value::<(String, String, String, String)>(value.clone())
                .ok()
                .map(|(_, user_id, credentials, auth_id)| Self::Auth {
                    user_id,
                    credentials,
                    auth_id,
                }),
            Some(ACTION) => serde_json::from_value::<ActionCommand>(value.clone())
                .ok()
                .map(Self::Action),
            _ => None,
        };
        parsed.unwrap_or(Self::Unknown(value))
    }
}

impl Serialize for InputCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auth {
                user_id,
                credentials,
                auth_id,
            } => (AUTH, user_id, credentials, auth_id).serialize(serializer),
            Self::Action(command) => command.serialize(serializer),
            Self::Unknown(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InputCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// `["action", action, meta]`, used both inbound and towards the control
/// endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCommand {
    pub action: Action,
    pub meta: Meta,
}

impl ActionCommand {
    pub fn new(action: Action, meta: Meta) -> Self {
        Self { action, meta }
    }
}

impl Serialize for ActionCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (ACTION, &self.action, &self.meta).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ActionCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, action, meta) = <(String, Action, Meta)>::deserialize(deserializer)?;
        if tag != ACTION {
            return Err(de::Error::invalid_value(
                de::Unexpected::Str(&tag),
                &"\"action\"",
            ));
        }
        Ok(Self { action, meta })
    }
}

/// Answer written to the output stream for an input command.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCommand {
    Authenticated(String),
    Denied(String),
    Approved(String),
    Processed(String),
    Forbidden(String),
    Error(String),
    Resend(String, PartialMeta),
    UnknownAction(String),
    UnknownChannel(String),
}

impl OutputCommand {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => AUTHENTICATED,
            Self::Denied(_) => DENIED,
            Self::Approved(_) => APPROVED,
            Self::Processed(_) => PROCESSED,
            Self::Forbidden(_) => FORBIDDEN,
            Self::Error(_) => ERROR,
            Self::Resend(..) => RESEND,
            Self::UnknownAction(_) => UNKNOWN_ACTION,
            Self::UnknownChannel(_) => UNKNOWN_CHANNEL,
        }
    }

    /// Auth id, meta id or error message, depending on the variant.
    pub fn subject(&self) -> &str {
        match self {
            Self::Authenticated(s)
            | Self::Denied(s)
            | Self::Approved(s)
            | Self::Processed(s)
            | Self::Forbidden(s)
            | Self::Error(s)
            | Self::Resend(s, _)
            | Self::UnknownAction(s)
            | Self::UnknownChannel(s) => s,
        }
    }
}

impl Serialize for OutputCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if matches!(self, Self::Resend(..)) { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(self.tag())?;
        seq.serialize_element(self.subject())?;
        if let Self::Resend(_, overrides) = self {
            seq.serialize_element(overrides)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for OutputCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut items = Vec::<Value>::deserialize(deserializer)?.into_iter();
        let tag = match items.next() {
            Some(Value::String(tag)) => tag,
            _ => return Err(de::Error::custom("command tag must be a string")),
        };
        let subject = match items.next() {
            Some(Value::String(subject)) => subject,
            _ => return Err(de::Error::custom("command payload must be a string")),
        };
        let command = match tag.as_str() {
            AUTHENTICATED => Self::Authenticated(subject),
            DENIED => Self::Denied(subject),
            APPROVED => Self::Approved(subject),
            PROCESSED => Self::Processed(subject),
            FORBIDDEN => Self::Forbidden(subject),
            ERROR => Self::Error(subject),
            UNKNOWN_ACTION => Self::UnknownAction(subject),
            UNKNOWN_CHANNEL => Self::UnknownChannel(subject),
            RESEND => {
                let overrides = items
                    .next()
                    .ok_or_else(|| de::Error::custom("resend command needs meta overrides"))?;
                Self::Resend(
                    subject,
                    serde_json::from_value(overrides).map_err(de::Error::custom)?,
                )
            }
            other => return Err(de::Error::custom(format!("unknown command: {other}"))),
        };
        if items.next().is_some() {
            return Err(de::Error::custom(format!("too many elements in {tag} command")));
        }
        Ok(command)
    }
}
