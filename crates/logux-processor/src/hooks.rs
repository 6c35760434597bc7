use anyhow::Result;
use async_trait::async_trait;

use crate::action::Action;
use crate::command::ActionCommand;
use crate::context::Context;
use crate::error::ProcessorError;
use crate::meta::{Meta, PartialMeta};

/// Application decisions the processor delegates to.
///
/// Every decision that has no sensible default fails with
/// [`ProcessorError::NotImplemented`] until overridden. `resend` defaults to
/// "no redirection" and `initial_data` to "nothing to send".
///
/// Returning `Err` from any per-action method turns into an `["error", ..]`
/// answer for that action only; an `Err` from `authenticate` stops the rest
/// of the batch.
#[async_trait]
pub trait Hooks: Send + Sync + 'static {
    /// Per-action scratch data available to every hook through
    /// [`Context::data`].
    type Data: Default + Send + Sync;

    /// Build the context every other hook of this action receives. Override
    /// to fill [`Context::data`] before the first decision is made.
    async fn create_context(&self, meta: &Meta) -> Result<Context<Self::Data>> {
        Ok(Context::from_meta(meta)?)
    }

    async fn authenticate(&self, user_id: &str, credentials: &str) -> Result<bool> {
        let _ = (user_id, credentials);
        Err(ProcessorError::NotImplemented.into())
    }

    async fn access(
        &self,
        ctx: &mut Context<Self::Data>,
        action: &Action,
        meta: &Meta,
    ) -> Result<bool> {
        let _ = (ctx, action, meta);
        Err(ProcessorError::NotImplemented.into())
    }

    async fn is_valid_action(
        &self,
        ctx: &mut Context<Self::Data>,
        action: &Action,
        meta: &Meta,
    ) -> Result<bool> {
        let _ = (ctx, action, meta);
        Err(ProcessorError::NotImplemented.into())
    }

    async fn is_valid_channel(
        &self,
        ctx: &mut Context<Self::Data>,
        channel: &str,
        meta: &Meta,
    ) -> Result<bool> {
        let _ = (ctx, channel, meta);
        Err(ProcessorError::NotImplemented.into())
    }

    /// Extra recipients for the action. `Some` is reported to the server even
    /// when every override field is empty.
    async fn resend(
        &self,
        ctx: &mut Context<Self::Data>,
        action: &Action,
        meta: &Meta,
    ) -> Result<Option<PartialMeta>> {
        let _ = (ctx, action, meta);
        Ok(None)
    }

    async fn process(
        &self,
        ctx: &mut Context<Self::Data>,
        action: &Action,
        meta: &Meta,
    ) -> Result<()> {
        let _ = (ctx, action, meta);
        Err(ProcessorError::NotImplemented.into())
    }

    /// Actions pushed to the new subscriber through the control endpoint.
    async fn initial_data(
        &self,
        ctx: &mut Context<Self::Data>,
        channel: &str,
        meta: &Meta,
    ) -> Result<Vec<ActionCommand>> {
        let _ = (ctx, channel, meta);
        Ok(Vec::new())
    }
}
