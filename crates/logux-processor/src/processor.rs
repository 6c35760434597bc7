use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures_util::FutureExt;

use crate::action::{Action, ActionKind};
use crate::command::{ActionCommand, InputCommand, OutputCommand, Request};
use crate::config::ProcessorSettings;
use crate::context::Context;
use crate::control::{ControlClient, Notifier};
use crate::error::ProcessorError;
use crate::hooks::Hooks;
use crate::meta::Meta;
use crate::stream::{OutputStream, OutputWriter};

const UNKNOWN_COMMAND: &str = "Unknown command";

/// What to run once an action has been approved.
enum Execution<'a> {
    Subscribe(&'a str),
    Process,
}

/// Answers Logux server requests by driving each command through the
/// application [`Hooks`].
///
/// Cheap to clone; clones share the hooks and the control client.
pub struct Processor<H: Hooks> {
    settings: Arc<ProcessorSettings>,
    hooks: Arc<H>,
    notifier: Arc<dyn Notifier>,
}

impl<H: Hooks> Clone for Processor<H> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            hooks: self.hooks.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<H: Hooks> Processor<H> {
    /// Build a processor that talks to `settings.control_url` over HTTP.
    pub fn new(settings: ProcessorSettings, hooks: H) -> Result<Self> {
        let notifier = Arc::new(ControlClient::new(&settings)?);
        Ok(Self::with_notifier(settings, hooks, notifier))
    }

    pub fn with_notifier(
        settings: ProcessorSettings,
        hooks: H,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            hooks: Arc::new(hooks),
            notifier,
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Validate the request envelope and start answering its commands.
    ///
    /// Version and password are checked before anything is spawned, so a
    /// rejected request never produces an output stream. On success the
    /// returned stream already holds `[` and is filled by a background task
    /// in command order. Must be called from within a tokio runtime.
    pub fn stream_for_request(&self, request: Request) -> Result<OutputStream, ProcessorError> {
        if request.version != self.settings.version {
            tracing::warn!(
                expected = self.settings.version,
                got = request.version,
                "rejecting request with unsupported protocol version"
            );
            return Err(ProcessorError::NotAcceptable);
        }
        if request.password != self.settings.control_password {
            tracing::warn!("rejecting request with wrong control password");
            return Err(ProcessorError::Unauthorized);
        }

        let (mut writer, stream) = OutputWriter::open();
        if request.commands.is_empty() {
            writer.close();
            return Ok(stream);
        }

        let this = self.clone();
        tokio::spawn(async move {
            let drained = AssertUnwindSafe(this.process_batch(&mut writer, request.commands))
                .catch_unwind()
                .await;
            if drained.is_err() {
                tracing::error!("command batch panicked; closing output");
            }
            writer.close();
        });

        Ok(stream)
    }

    /// Push actions to the Logux server through the control endpoint.
    pub async fn send(&self, commands: &[ActionCommand]) -> Result<bool> {
        self.notifier.send(commands).await
    }

    async fn process_batch(&self, writer: &mut OutputWriter, commands: Vec<InputCommand>) {
        for command in commands {
            if writer.is_consumer_gone() {
                tracing::debug!("output consumer went away; stopping batch");
                break;
            }
            match command {
                InputCommand::Auth {
                    user_id,
                    credentials,
                    auth_id,
                } => {
                    if let Err(e) = self
                        .process_auth(writer, &user_id, &credentials, auth_id)
                        .await
                    {
                        tracing::error!(
                            user_id = %user_id,
                            error = %e,
                            "authentication hook failed; aborting batch"
                        );
                        break;
                    }
                }
                InputCommand::Action(ActionCommand { action, meta }) => {
                    if let Err(e) = self.process_action(writer, &action, &meta).await {
                        tracing::warn!(meta_id = %meta.id, error = %e, "action failed");
                        writer.push(&OutputCommand::Error(e.to_string()));
                    }
                }
                InputCommand::Unknown(raw) => {
                    tracing::warn!(command = %raw, "unknown command; dropping rest of batch");
                    writer.push(&OutputCommand::Error(UNKNOWN_COMMAND.to_string()));
                    break;
                }
            }
        }
    }

    async fn process_auth(
        &self,
        writer: &mut OutputWriter,
        user_id: &str,
        credentials: &str,
        auth_id: String,
    ) -> Result<()> {
        let authenticated = self.hooks.authenticate(user_id, credentials).await?;
        tracing::debug!(user_id = %user_id, authenticated, "processed auth command");
        if authenticated {
            writer.push(&OutputCommand::Authenticated(auth_id));
        } else {
            writer.push(&OutputCommand::Denied(auth_id));
        }
        Ok(())
    }

    async fn process_action(
        &self,
        writer: &mut OutputWriter,
        action: &Action,
        meta: &Meta,
    ) -> Result<()> {
        let mut ctx = self.hooks.create_context(meta).await?;
        tracing::debug!(
            meta_id = %meta.id,
            action = %action.kind,
            user_id = %ctx.user_id,
            "processing action"
        );

        match action.classify() {
            ActionKind::Subscribe { channel: None } => {
                writer.push(&OutputCommand::UnknownChannel(meta.id.clone()));
            }
            ActionKind::Subscribe {
                channel: Some(channel),
            } => {
                if self.hooks.is_valid_channel(&mut ctx, channel, meta).await? {
                    self.authorize_and_execute(
                        writer,
                        &mut ctx,
                        action,
                        meta,
                        Execution::Subscribe(channel),
                    )
                    .await?;
                } else {
                    writer.push(&OutputCommand::UnknownChannel(meta.id.clone()));
                }
            }
            ActionKind::Other => {
                if !self.hooks.is_valid_action(&mut ctx, action, meta).await? {
                    writer.push(&OutputCommand::UnknownAction(meta.id.clone()));
                    return Ok(());
                }
                if let Some(overrides) = self.hooks.resend(&mut ctx, action, meta).await? {
                    writer.push(&OutputCommand::Resend(meta.id.clone(), overrides));
                }
                self.authorize_and_execute(writer, &mut ctx, action, meta, Execution::Process)
                    .await?;
            }
        }
        Ok(())
    }

    async fn authorize_and_execute(
        &self,
        writer: &mut OutputWriter,
        ctx: &mut Context<H::Data>,
        action: &Action,
        meta: &Meta,
        execution: Execution<'_>,
    ) -> Result<()> {
        if !self.hooks.access(ctx, action, meta).await? {
            writer.push(&OutputCommand::Forbidden(meta.id.clone()));
            return Ok(());
        }
        writer.push(&OutputCommand::Approved(meta.id.clone()));

        let executed = match execution {
            Execution::Subscribe(channel) => self.subscribe(ctx, channel, meta).await,
            Execution::Process => self.hooks.process(ctx, action, meta).await,
        };
        match executed {
            Ok(()) => {
                writer.push(&OutputCommand::Processed(meta.id.clone()));
            }
            Err(e) => {
                tracing::warn!(
                    meta_id = %meta.id,
                    error = %e,
                    "approved action failed to execute"
                );
                writer.push(&OutputCommand::Error(e.to_string()));
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        ctx: &mut Context<H::Data>,
        channel: &str,
        meta: &Meta,
    ) -> Result<()> {
        let commands = self.hooks.initial_data(ctx, channel, meta).await?;
        if commands.is_empty() {
            return Ok(());
        }
        // The answer is not part of this request's outcome.
        if !self.notifier.send(&commands).await? {
            tracing::warn!(
                meta_id = %meta.id,
                channel,
                "initial data was not accepted by control endpoint"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::PartialMeta;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Vec<ActionCommand>>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, commands: &[ActionCommand]) -> Result<bool> {
            self.sent
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(commands.to_vec());
            Ok(false)
        }
    }

    /// Accepts everything; actions of type `fail` blow up in `process`.
    struct Permissive;

    #[async_trait]
    impl Hooks for Permissive {
        type Data = Vec<&'static str>;

        async fn authenticate(&self, _user_id: &str, credentials: &str) -> Result<bool> {
            Ok(credentials == "good")
        }

        async fn access(
            &self,
            ctx: &mut Context<Self::Data>,
            _: &Action,
            _: &Meta,
        ) -> Result<bool> {
            ctx.data.push("access");
            Ok(true)
        }

        async fn is_valid_action(
            &self,
            ctx: &mut Context<Self::Data>,
            _: &Action,
            _: &Meta,
        ) -> Result<bool> {
            ctx.data.push("valid");
            Ok(true)
        }

        async fn is_valid_channel(
            &self,
            _: &mut Context<Self::Data>,
            _: &str,
            _: &Meta,
        ) -> Result<bool> {
            Ok(true)
        }

        async fn resend(
            &self,
            _: &mut Context<Self::Data>,
            _: &Action,
            _: &Meta,
        ) -> Result<Option<PartialMeta>> {
            Ok(Some(PartialMeta::default()))
        }

        async fn process(
            &self,
            ctx: &mut Context<Self::Data>,
            action: &Action,
            _: &Meta,
        ) -> Result<()> {
            if ctx.data != ["valid", "access"] {
                return Err(anyhow!("context data lost: {:?}", ctx.data));
            }
            if action.is_type("fail") {
                return Err(anyhow!("process failed"));
            }
            Ok(())
        }

        async fn initial_data(
            &self,
            _: &mut Context<Self::Data>,
            channel: &str,
            _: &Meta,
        ) -> Result<Vec<ActionCommand>> {
            Ok(vec![ActionCommand::new(
                Action::new("channel/snapshot").with_field("channel", json!(channel)),
                Meta::new("1 server:a 0", "server:a"),
            )])
        }
    }

    fn processor(recorder: Arc<Recorder>) -> Processor<Permissive> {
        Processor::with_notifier(
            ProcessorSettings::new("http://127.0.0.1:1/", "password"),
            Permissive,
            recorder,
        )
    }

    fn request(commands: Vec<InputCommand>) -> Request {
        Request {
            version: 2,
            password: "password".to_string(),
            commands,
        }
    }

    async fn run<H: Hooks>(
        processor: &Processor<H>,
        commands: Vec<InputCommand>,
    ) -> Vec<OutputCommand> {
        let stream = processor.stream_for_request(request(commands)).unwrap();
        serde_json::from_str(&stream.read_to_string().await).unwrap()
    }

    #[tokio::test]
    async fn context_data_flows_between_hooks() {
        let p = processor(Arc::default());
        let meta = Meta::new("1 10:a:b 0", "s");
        let out = run(&p, vec![InputCommand::action(Action::new("ok"), meta)]).await;
        assert_eq!(
            out,
            vec![
                OutputCommand::Resend("1 10:a:b 0".into(), PartialMeta::default()),
                OutputCommand::Approved("1 10:a:b 0".into()),
                OutputCommand::Processed("1 10:a:b 0".into()),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_initial_data_still_processed() {
        let recorder = Arc::new(Recorder::default());
        let p = processor(recorder.clone());
        let meta = Meta::new("2 10:a:b 0", "s");
        let out = run(&p, vec![InputCommand::action(Action::subscribe("room/1"), meta)]).await;
        assert_eq!(
            out,
            vec![
                OutputCommand::Approved("2 10:a:b 0".into()),
                OutputCommand::Processed("2 10:a:b 0".into()),
            ]
        );
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0].action.fields["channel"], json!("room/1"));
    }

    #[tokio::test]
    async fn subscribe_without_channel_is_unknown() {
        let recorder = Arc::new(Recorder::default());
        let p = processor(recorder.clone());
        let meta = Meta::new("3 10:a:b 0", "s");
        let out = run(
            &p,
            vec![InputCommand::action(Action::new("logux/subscribe"), meta)],
        )
        .await;
        assert_eq!(out, vec![OutputCommand::UnknownChannel("3 10:a:b 0".into())]);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_meta_id_is_isolated() {
        let p = processor(Arc::default());
        let out = run(
            &p,
            vec![
                InputCommand::action(Action::new("ok"), Meta::new("no-node-here", "s")),
                InputCommand::auth("10", "good", "a1"),
            ],
        )
        .await;
        assert_eq!(
            out,
            vec![
                OutputCommand::Error("malformed action id: no-node-here".into()),
                OutputCommand::Authenticated("a1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn dropped_consumer_stops_batch() {
        let recorder = Arc::new(Recorder::default());
        let p = processor(recorder.clone());
        let (mut writer, stream) = OutputWriter::open();
        drop(stream);
        p.process_batch(
            &mut writer,
            vec![InputCommand::action(
                Action::subscribe("room/1"),
                Meta::new("1 a:b:c 0", "s"),
            )],
        )
        .await;
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn public_send_uses_notifier() {
        let recorder = Arc::new(Recorder::default());
        let p = processor(recorder.clone());
        let delivered = p
            .send(&[ActionCommand::new(Action::new("a"), Meta::new("1 server:x 0", "s"))])
            .await
            .unwrap();
        assert!(!delivered);
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }

    /// Validates everything, always redirects, and denies every action.
    #[derive(Default)]
    struct Gatekeeper {
        executed: std::sync::atomic::AtomicUsize,
    }

    impl Gatekeeper {
        fn executed(&self) -> usize {
            self.executed.load(std::sync::atomic::Ordering::SeqCst)
        }

        fn record(&self) {
            self.executed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Hooks for Gatekeeper {
        type Data = ();

        async fn access(&self, _: &mut Context, _: &Action, _: &Meta) -> Result<bool> {
            Ok(false)
        }

        async fn is_valid_action(&self, _: &mut Context, _: &Action, _: &Meta) -> Result<bool> {
            Ok(true)
        }

        async fn is_valid_channel(&self, _: &mut Context, _: &str, _: &Meta) -> Result<bool> {
            Ok(true)
        }

        async fn resend(
            &self,
            _: &mut Context,
            _: &Action,
            _: &Meta,
        ) -> Result<Option<PartialMeta>> {
            Ok(Some(PartialMeta::default()))
        }

        async fn process(&self, _: &mut Context, _: &Action, _: &Meta) -> Result<()> {
            self.record();
            Ok(())
        }

        async fn initial_data(
            &self,
            _: &mut Context,
            _: &str,
            _: &Meta,
        ) -> Result<Vec<ActionCommand>> {
            self.record();
            Ok(vec![ActionCommand::new(
                Action::new("channel/snapshot"),
                Meta::new("1 server:a 0", "server:a"),
            )])
        }
    }

    #[tokio::test]
    async fn resend_precedes_forbidden() {
        let recorder = Arc::new(Recorder::default());
        let p = Processor::with_notifier(
            ProcessorSettings::new("http://127.0.0.1:1/", "password"),
            Gatekeeper::default(),
            recorder.clone(),
        );
        let stream = p
            .stream_for_request(request(vec![InputCommand::action(
                Action::new("posts/add"),
                Meta::new("1 u:c:n 0", "s"),
            )]))
            .unwrap();
        assert_eq!(
            stream.read_to_string().await,
            r#"[["resend","1 u:c:n 0",{}],["forbidden","1 u:c:n 0"]]"#
        );
        assert_eq!(p.hooks().executed(), 0);
    }

    #[tokio::test]
    async fn denied_subscription_sends_no_initial_data() {
        let recorder = Arc::new(Recorder::default());
        let p = Processor::with_notifier(
            ProcessorSettings::new("http://127.0.0.1:1/", "password"),
            Gatekeeper::default(),
            recorder.clone(),
        );
        let out = run(
            &p,
            vec![
                InputCommand::action(Action::new("posts/add"), Meta::new("1 u:c:n 0", "s")),
                InputCommand::action(Action::subscribe("posts/1"), Meta::new("2 u:c:n 0", "s")),
            ],
        )
        .await;
        assert_eq!(
            out,
            vec![
                OutputCommand::Resend("1 u:c:n 0".into(), PartialMeta::default()),
                OutputCommand::Forbidden("1 u:c:n 0".into()),
                OutputCommand::Forbidden("2 u:c:n 0".into()),
            ]
        );
        assert_eq!(p.hooks().executed(), 0);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    /// Loads the acting user before any decision hook runs.
    struct Seeded;

    #[async_trait]
    impl Hooks for Seeded {
        type Data = String;

        async fn create_context(&self, meta: &Meta) -> Result<Context<String>> {
            let mut ctx = Context::from_meta(meta)?;
            ctx.data = format!("profile of {}", ctx.user_id);
            Ok(ctx)
        }

        async fn access(&self, ctx: &mut Context<String>, _: &Action, _: &Meta) -> Result<bool> {
            Ok(ctx.data == "profile of 10")
        }

        async fn is_valid_action(
            &self,
            ctx: &mut Context<String>,
            _: &Action,
            _: &Meta,
        ) -> Result<bool> {
            Ok(!ctx.data.is_empty())
        }

        async fn process(&self, _: &mut Context<String>, _: &Action, _: &Meta) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn custom_context_reaches_every_hook() {
        let p = Processor::with_notifier(
            ProcessorSettings::new("http://127.0.0.1:1/", "password"),
            Seeded,
            Arc::new(Recorder::default()),
        );
        let out = run(
            &p,
            vec![
                InputCommand::action(Action::new("a"), Meta::new("1 10:c:n 0", "s")),
                InputCommand::action(Action::new("a"), Meta::new("2 11:c:n 0", "s")),
            ],
        )
        .await;
        assert_eq!(
            out,
            vec![
                OutputCommand::Approved("1 10:c:n 0".into()),
                OutputCommand::Processed("1 10:c:n 0".into()),
                OutputCommand::Forbidden("2 11:c:n 0".into()),
            ]
        );
    }

    #[tokio::test]
    async fn settings_are_shared_with_clones() {
        let p = processor(Arc::default());
        assert_eq!(p.settings().version, crate::config::DEFAULT_VERSION);
        assert_eq!(p.settings().control_password, "password");

        let clone = p.clone();
        let stream = clone
            .stream_for_request(Request {
                version: clone.settings().version,
                password: clone.settings().control_password.clone(),
                commands: vec![],
            })
            .unwrap();
        assert_eq!(stream.read_to_string().await, "[]");
    }
}
