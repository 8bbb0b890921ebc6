//! Bulwark CLI - inspect configuration and exercise the authorization core
//!
//! Commands print JSON (or TOML for `status`) on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use bulwark_audit::{TracingAuditSink, TrustLevel};
use bulwark_core::BulwarkConfig;
use bulwark_council::{GovernanceRequest, LocalCouncil, PolicyGovernor};
use bulwark_registry::{CapabilityManifest, ToolRegistry};
use bulwark_sanitizer::{InboundMessage, Sanitizer};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bulwark")]
#[command(version, about = "Bulwark - authorization core for autonomous agents")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "bulwark.toml")]
        config: PathBuf,
    },
    /// Load a capability manifest and print the catalog
    Manifest {
        /// `.json` or `.toml` manifest
        path: PathBuf,
    },
    /// Sanitize a message and print the result
    Sanitize {
        /// Sender the rate limit is charged to
        #[arg(long, default_value = "cli")]
        sender: String,
        #[arg(long, default_value = "cli")]
        channel: String,
        /// Sender trust level
        #[arg(long, default_value = "untrusted")]
        trust: TrustLevel,
        /// Read raw bytes from a file instead of TEXT
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Message text
        text: Option<String>,
        /// Configuration file for sanitizer settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the spend governor against the in-process council
    Govern {
        /// Estimated cost in USD
        #[arg(long)]
        cost: f64,
        #[arg(long, default_value = "cli")]
        requester: String,
        #[arg(long, default_value = "standard")]
        trust: TrustLevel,
        #[arg(long)]
        security_sensitive: bool,
        /// Content the spend is for; its size drives the resource veto
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long, default_value = "unspecified")]
        model: String,
        /// Configuration file for governor settings
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print component defaults
    Status,
}

fn init_tracing(json: bool, default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<BulwarkConfig> {
    match path {
        Some(path) => BulwarkConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(BulwarkConfig::default()),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, &cli.log_level);

    match cli.command {
        Commands::Check { config } => {
            let loaded = BulwarkConfig::load(&config)
                .with_context(|| format!("invalid configuration {}", config.display()))?;
            info!(path = %config.display(), "configuration valid");
            print_json(&json!({
                "valid": true,
                "providers": loaded.providers,
                "max_concurrent": loaded.executor.max_concurrent,
                "manifest": loaded.registry.manifest,
                "ledger_path": loaded.storage.ledger_path,
            }))?;
        }
        Commands::Manifest { path } => {
            let manifest = CapabilityManifest::load(&path)
                .with_context(|| format!("failed to read manifest {}", path.display()))?;
            let registry = ToolRegistry::new(Arc::new(TracingAuditSink));
            let loaded = registry.load_capabilities_from_config(manifest)?;
            info!(loaded, "manifest loaded");
            print_json(&serde_json::to_value(registry.list())?)?;
        }
        Commands::Sanitize {
            sender,
            channel,
            trust,
            file,
            text,
            config,
        } => {
            let content = match (file, text) {
                (Some(path), _) => std::fs::read(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, Some(text)) => text.into_bytes(),
                (None, None) => bail!("pass TEXT or --file"),
            };
            let config = load_or_default(config.as_ref())?;
            let sanitizer = Sanitizer::new(config.sanitizer, Arc::new(TracingAuditSink))?;
            let out = sanitizer.sanitize_with_trust(InboundMessage::new(sender, channel, content), trust)?;
            print_json(&json!({
                "sender_id": out.sender_id(),
                "channel": out.channel(),
                "cleaned": out.cleaned(),
                "flags": out.flags(),
            }))?;
        }
        Commands::Govern {
            cost,
            requester,
            trust,
            security_sensitive,
            content,
            model,
            config,
        } => {
            let config = load_or_default(config.as_ref())?;
            let governor = PolicyGovernor::new(
                config.governor,
                Arc::new(LocalCouncil::default()),
                Arc::new(TracingAuditSink),
            )?;
            let request =
                GovernanceRequest::new(requester, trust, content).with_security_sensitive(security_sensitive);
            let decision = governor.request_approval(&request, cost, &model).await;
            print_json(&serde_json::to_value(&decision)?)?;
        }
        Commands::Status => {
            print!("{}", BulwarkConfig::default().to_toml_string()?);
        }
    }

    Ok(())
}
