//! Pushing actions to the Logux server's control endpoint.

use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::command::ActionCommand;
use crate::config::ProcessorSettings;

/// Delivers action commands to the Logux server.
///
/// `Ok(false)` means the server answered but did not accept the batch;
/// `Err` means it could not be reached.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, commands: &[ActionCommand]) -> Result<bool>;
}

#[derive(Debug, Serialize)]
struct ControlBody<'a> {
    version: u32,
    password: &'a str,
    commands: &'a [ActionCommand],
}

/// [`Notifier`] posting `{version, password, commands}` as JSON.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    url: String,
    password: String,
    version: u32,
}

impl ControlClient {
    pub fn new(settings: &ProcessorSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("logux-processor/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build control HTTP client")?;
        Ok(Self {
            http,
            url: settings.control_url.clone(),
            password: settings.control_password.clone(),
            version: settings.version,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for ControlClient {
    async fn send(&self, commands: &[ActionCommand]) -> Result<bool> {
        let body = ControlBody {
            version: self.version,
            password: &self.password,
            commands,
        };
        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach control endpoint {}", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, %status, "control endpoint rejected commands");
        }
        tracing::debug!(
            url = %self.url,
            count = commands.len(),
            %status,
            "sent commands to control endpoint"
        );
        Ok(status.is_success())
    }
}
