mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chatrelay::gateway::{self, GatewayState, StaticTokenVerifier};

use crate::cli::Cli;

fn load_dotenv() {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.gateway_config();
    if config.provider_secret().is_err() {
        warn!("PROVIDER_API_KEY is not set; chat requests will fail with failed-precondition");
    }

    let verifier = StaticTokenVerifier::parse(&cli.tokens).context("invalid GATEWAY_TOKENS")?;
    if verifier.is_empty() {
        warn!("no identity tokens configured; every request will be rejected");
    }
    info!(tokens = verifier.len(), "token table loaded");

    let state = GatewayState::new(config, Arc::new(verifier))?;
    let addr = cli.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    gateway::serve(listener, state).await
}

#[tokio::main]
async fn main() {
    load_dotenv();
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("relay-gateway: {err:#}");
        std::process::exit(1);
    }
}
