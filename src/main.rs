//! Armature Runtime
//!
//! Entry point for the framework binary: initialize an identity, show the
//! current configuration, or serve the demo echo tool server.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use armature::auth::{keys, AgentSigner};
use armature::config::{get_config_path, load_config, save_config};
use armature::payment::PaymentDetails;
use armature::server::tool::EchoTool;
use armature::server::{serve, ToolServer};
use armature::types::default_config;

const VERSION: &str = "0.1.0";

/// Armature -- Tool-Invocation RPC Framework for LLM Agents
#[derive(Parser, Debug)]
#[command(name = "armature", version = VERSION, about = "Tool-invocation RPC framework for LLM agents")]
struct Cli {
    /// Initialize the agent keypair and a default config
    #[arg(long)]
    init: bool,

    /// Show the current identity and configuration
    #[arg(long)]
    status: bool,

    /// Serve the demo echo tool server
    #[arg(long)]
    serve: bool,
}

fn show_status() {
    if !keys::keypair_exists() {
        println!("No identity found. Run with --init first.");
        return;
    }

    let signer = match AgentSigner::load_or_create() {
        Ok(signer) => signer,
        Err(e) => {
            eprintln!("Failed to load keypair: {}", e);
            return;
        }
    };

    let config = load_config().unwrap_or_else(default_config);

    println!(
        r#"
=== ARMATURE STATUS ===
Identity:   {}
Name:       {}
Model:      {}
Servers:    {}
Port:       {}
=======================
"#,
        signer.identifier(),
        if config.name.is_empty() { "(unset)" } else { config.name.as_str() },
        config.model.model,
        config.tool_servers.len(),
        config.serve_port,
    );
}

fn init() -> Result<()> {
    let signer = AgentSigner::load_or_create()?;
    println!("Agent identity: {}", signer.identifier());

    if load_config().is_none() {
        save_config(&default_config())?;
        println!("Wrote default config to {:?}", get_config_path());
    } else {
        println!("Config already exists at {:?}", get_config_path());
    }

    Ok(())
}

async fn serve_demo() -> Result<()> {
    let config = load_config().unwrap_or_else(default_config);

    let server = ToolServer::new("armature-demo", VERSION)
        .register(EchoTool::free("echo-free"))
        .register(EchoTool::gated(
            "echo-paid",
            PaymentDetails::Credit {
                amount: 1.0,
                credit_id: "demo-credit".to_string(),
                description: None,
            },
        ));

    serve(Arc::new(server), config.serve_port).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.init {
        init()?;
    } else if cli.serve {
        serve_demo().await?;
    } else {
        show_status();
    }

    Ok(())
}
