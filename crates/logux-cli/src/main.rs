use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use logux_processor::{ActionCommand, Context, ControlClient, Notifier, ProcessorSettings};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logux", about = "Tools for a Logux back-end processor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push action commands to the Logux server control endpoint
    Send {
        /// TOML file with control_url / control_password / version
        #[arg(long)]
        config: Option<PathBuf>,

        /// Control endpoint URL (overrides the config file)
        #[arg(long)]
        control_url: Option<String>,

        /// Control password (overrides the config file)
        #[arg(long, env = "LOGUX_CONTROL_PASSWORD")]
        password: Option<String>,

        /// Protocol version (overrides the config file)
        #[arg(long)]
        protocol_version: Option<u32>,

        /// JSON array of ["action", action, meta] commands; `-` reads stdin
        #[arg(default_value = "-")]
        input: String,
    },

    /// Print the node, user and client ids encoded in an action id
    Context {
        /// Meta id, e.g. "1 10:uuid:n1 1560954012838"
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "logux=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Send {
            config,
            control_url,
            password,
            protocol_version,
            input,
        } => {
            let settings = resolve_settings(config, control_url, password, protocol_version)?;
            let commands = read_commands(&input)?;
            cmd_send(&settings, &commands).await
        }
        Commands::Context { id } => cmd_context(&id),
    }
}

fn resolve_settings(
    config: Option<PathBuf>,
    control_url: Option<String>,
    password: Option<String>,
    protocol_version: Option<u32>,
) -> Result<ProcessorSettings> {
    let mut settings = match (&config, &control_url, &password) {
        (Some(path), _, _) => ProcessorSettings::load(path)?,
        (None, Some(url), Some(password)) => ProcessorSettings::new(url, password),
        (None, _, _) => bail!("either --config or both --control-url and --password are required"),
    };
    if let Some(url) = control_url {
        settings.control_url = url;
    }
    if let Some(password) = password {
        settings.control_password = password;
    }
    if let Some(version) = protocol_version {
        settings.version = version;
    }
    Ok(settings)
}

fn read_commands(input: &str) -> Result<Vec<ActionCommand>> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read commands from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
    };
    serde_json::from_str(&raw).context("expected a JSON array of [\"action\", action, meta]")
}

async fn cmd_send(settings: &ProcessorSettings, commands: &[ActionCommand]) -> Result<()> {
    if commands.is_empty() {
        bail!("no commands to send");
    }
    let client = ControlClient::new(settings)?;
    tracing::info!(url = %client.url(), count = commands.len(), "sending commands");
    if !client.send(commands).await? {
        bail!("control endpoint rejected {} command(s)", commands.len());
    }
    println!("sent {} command(s)", commands.len());
    Ok(())
}

fn cmd_context(id: &str) -> Result<()> {
    let ctx = Context::<()>::from_id(id)?;
    let value = serde_json::json!({
        "node_id": ctx.node_id,
        "user_id": ctx.user_id,
        "client_id": ctx.client_id,
        "is_server": ctx.is_server(),
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
