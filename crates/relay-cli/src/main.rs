use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::RelayConfig;
use relay_core::{ChatRelay, ChatRequest};
use relay_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "relay")]
#[command(version)]
#[command(about = "Relay chat prompts to OpenRouter with ordered model fallback")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Start {
        /// Address to listen on, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Send a one-shot prompt through the fallback chain
    Ask {
        /// The prompt to send
        message: String,

        /// System prompt override
        #[arg(long)]
        system: Option<String>,
    },

    /// Write the default config file
    Init,

    /// Show the effective configuration
    Config,

    /// List model candidates in dispatch order
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Models => cmd_models(&cli.config),
        Commands::Start { bind } => cmd_start(&cli.config, bind).await,
        Commands::Ask { message, system } => cmd_ask(&cli.config, message, system).await,
    }
}

fn resolve_config_dir(config_path: &Option<PathBuf>) -> PathBuf {
    config_path
        .as_ref()
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(config::config_dir)
}

fn build_relay(config_path: &Option<PathBuf>, cfg: &RelayConfig) -> Result<ChatRelay> {
    let settings = cfg.to_settings(&resolve_config_dir(config_path))?;
    if settings.api_key().is_none() {
        warn!("OPENROUTER_API_KEY is not set; every request will fail with a configuration error");
    }
    ChatRelay::new(settings).context("Failed to build relay")
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("relay initialized at {}", config_dir.display());
    println!(
        "Export OPENROUTER_API_KEY or edit {} to set your key.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

fn cmd_models(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    for (idx, model) in cfg.openrouter.models.iter().enumerate() {
        println!("{}. {}", idx + 1, model);
    }
    Ok(())
}

async fn cmd_start(config_path: &Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let mut cfg = RelayConfig::load(config_path)?;
    if let Some(bind) = bind {
        cfg.server.bind = bind;
    }
    let addr = cfg.bind_addr()?;
    let relay = Arc::new(build_relay(config_path, &cfg)?);

    info!("Starting relay gateway...");
    let cancel = CancellationToken::new();
    let mut server = GatewayServer::new(addr, relay).spawn(cancel.clone());

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown signal received");
            cancel.cancel();
            server.await.context("Gateway task panicked")??;
        }
        result = &mut server => {
            result.context("Gateway task panicked")??;
        }
    }

    Ok(())
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    message: String,
    system: Option<String>,
) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let relay = build_relay(config_path, &cfg)?;

    let request = ChatRequest {
        system: system.map(Value::String),
        ..ChatRequest::prompt(message)
    };
    let reply = relay.handle(request).await;

    println!("{}", reply.text());
    if !reply.is_success() {
        bail!("relay returned status {}", reply.status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_system() {
        let cli = Cli::parse_from(["relay", "ask", "hello", "--system", "be terse"]);
        match cli.command {
            Commands::Ask { message, system } => {
                assert_eq!(message, "hello");
                assert_eq!(system.as_deref(), Some("be terse"));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_start_with_global_flags() {
        let cli = Cli::parse_from(["relay", "start", "--bind", "0.0.0.0:8080", "--debug"]);
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Start { bind: Some(ref b) } if b == "0.0.0.0:8080"));
    }

    #[test]
    fn test_config_dir_follows_explicit_path() {
        let path = Some(PathBuf::from("/etc/relay/config.toml"));
        assert_eq!(resolve_config_dir(&path), PathBuf::from("/etc/relay"));
    }
}
