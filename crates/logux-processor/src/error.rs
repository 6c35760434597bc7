use thiserror::Error;

/// Faults raised at the request boundary, before any output is streamed.
///
/// `NotImplemented` is also what the default [`Hooks`](crate::Hooks) methods
/// return, so an application that forgets to supply a decision hook gets a
/// 501-classified failure the first time that hook is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessorError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Acceptable")]
    NotAcceptable,
    #[error("Not Implemented")]
    NotImplemented,
}

impl ProcessorError {
    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::NotAcceptable => 406,
            Self::NotImplemented => 501,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("malformed action id: {id}")]
    MalformedId { id: String },
}
