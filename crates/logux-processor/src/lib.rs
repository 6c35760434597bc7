//! Back-end command processor for the Logux HTTP protocol.
//!
//! The Logux server forwards batches of `auth` and `action` commands; a
//! [`Processor`] checks the request envelope, runs every command through the
//! application's [`Hooks`] in order, and streams the answers back as a single
//! JSON array while they are still being produced.

pub mod action;
pub mod command;
pub mod config;
pub mod context;
pub mod control;
pub mod error;
pub mod hooks;
pub mod meta;
pub mod processor;
pub mod stream;

pub use action::{Action, ActionKind, SUBSCRIBE_TYPE};
pub use command::{ActionCommand, InputCommand, OutputCommand, Request};
pub use config::ProcessorSettings;
pub use context::Context;
pub use control::{ControlClient, Notifier};
pub use error::{ContextError, ProcessorError};
pub use hooks::Hooks;
pub use meta::{Meta, MetaStatus, PartialMeta};
pub use processor::Processor;
pub use stream::{OutputStream, OutputWriter};
