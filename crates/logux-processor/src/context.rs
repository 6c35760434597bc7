use serde::Serialize;

use crate::error::ContextError;
use crate::meta::Meta;

/// User id reserved for actions created by the server itself.
pub const SERVER_USER_ID: &str = "server";

/// Identity of the node that created an action, read from its meta id.
///
/// `data` is a slot the application hooks may fill while one action moves
/// through the pipeline. A context is built per action and dropped once that
/// action's outcome has been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context<D = ()> {
    pub node_id: String,
    pub user_id: String,
    pub client_id: String,
    #[serde(skip)]
    pub data: D,
}

impl<D: Default> Context<D> {
    pub fn from_meta(meta: &Meta) -> Result<Self, ContextError> {
        Self::from_id(&meta.id)
    }

    /// Parse `"<seq> <user>:<client>:<node> <time>"`. The second
    /// space-separated token must exist and contain at least one `:`.
    pub fn from_id(id: &str) -> Result<Self, ContextError> {
        let node_id = id
            .split(' ')
            .nth(1)
            .filter(|token| token.contains(':'))
            .ok_or_else(|| ContextError::MalformedId { id: id.to_string() })?;

        let mut parts = node_id.split(':');
        let user_id = parts.next().unwrap_or_default();
        let client_suffix = parts.next().unwrap_or_default();

        Ok(Self {
            node_id: node_id.to_string(),
            user_id: user_id.to_string(),
            client_id: format!("{user_id}:{client_suffix}"),
            data: D::default(),
        })
    }
}

impl<D> Context<D> {
    pub fn is_server(&self) -> bool {
        self.user_id == SERVER_USER_ID
    }
}
