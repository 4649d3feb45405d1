// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use aegis_audit::{AuditChain, InMemoryAuditStorage};
use aegis_auth::AuthService;
use aegis_config::Settings;
use aegis_executor::{Executor, ExecutorConfig};
use aegis_gateway::{build_app, ws, AppState};
use aegis_ratelimit::RateLimiter;
use aegis_rbac::Rbac;
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aegis-gateway", version, about = "Security-substrate agent runtime gateway")]
struct Args {
    /// Enable verbose debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("aegis=debug")
    } else {
        EnvFilter::new("aegis=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (settings, warnings) = Settings::load().context("load settings")?;
    for warning in &warnings {
        tracing::warn!(target: "aegis.gateway", %warning, "configuration warning");
    }

    let rbac = Arc::new(Rbac::new());
    let rate_limiter = Arc::new(RateLimiter::default());
    let audit_storage = Arc::new(InMemoryAuditStorage::new());
    let audit = Arc::new(AuditChain::new(audit_storage, settings.audit_signing_key.clone().into_bytes()));
    audit.initialize().await.context("verify existing audit chain")?;

    let auth = Arc::new(AuthService::new(
        settings.admin_password_hash.clone(),
        settings.token_secret.clone(),
        Arc::clone(&rate_limiter),
        Arc::clone(&audit),
    ));

    let executor = Executor::new(ExecutorConfig::default(), Arc::clone(&rbac), Arc::clone(&rate_limiter), Arc::clone(&audit));
    let pump = Arc::clone(&executor).spawn_pump();

    let _sweeper = Arc::clone(&rate_limiter).spawn_sweeper(Duration::from_secs(60));
    let _janitor = auth.blacklist().spawn_janitor(Duration::from_secs(60));

    let state = Arc::new(AppState::new(rbac, auth, rate_limiter, audit, executor, settings.cors_origins.clone()));

    let _metrics_ticker = ws::spawn_metrics_ticker(Arc::clone(&state), Duration::from_secs(1));

    let app = build_app(Arc::clone(&state));

    let bind = format!("{}:{}", settings.bind_host, settings.bind_port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(bind = %bind, "aegis-gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .await
        .context("serve")?;

    pump.abort();
    Ok(())
}
