//! # Vigil Agent
//!
//! Headless monitoring agent. Logs in to the monitoring server, mirrors the
//! server's monitored-path list onto filesystem watches, classifies every
//! observed change against the server's categories, and reports the events
//! back. The path list is re-read on an interval so edits made in the web
//! interface take effect without restarting the agent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_config::AgentConfig;
use vigil_core::{ApiClient, CategoryCache, WatchService};
use vigil_model::MonitoredPath;

#[derive(Debug, Parser)]
#[command(name = "vigil-agent", version, about)]
struct Cli {
    /// Server base URL (overrides config)
    #[arg(long, env = "VIGIL_SERVER_URL")]
    server_url: Option<String>,

    /// Login username (overrides config)
    #[arg(short, long, env = "VIGIL_USERNAME")]
    username: Option<String>,

    /// Login password
    #[arg(short, long, env = "VIGIL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path-registry refresh interval in seconds (overrides config)
    #[arg(long, env = "VIGIL_REFRESH_SECS")]
    refresh_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (mut config, source) =
        AgentConfig::load_from_env().context("failed to load configuration")?;
    info!(?source, "configuration loaded");

    if let Some(url) = cli.server_url {
        config.server_url = url;
        config.validate().context("invalid server url")?;
    }
    if let Some(username) = cli.username {
        config.username = Some(username);
    }
    if let Some(secs) = cli.refresh_secs {
        config.refresh_interval_secs = secs;
    }

    let api = Arc::new(
        ApiClient::new(config.server_url.clone(), config.request_timeout())
            .context("failed to build HTTP client")?,
    );
    let categories = Arc::new(CategoryCache::new(Arc::clone(&api)));
    let watch = WatchService::new(
        Arc::clone(&api),
        Arc::clone(&categories),
        config.scan.clone(),
    );

    if !api.check_connection().await {
        warn!(url = %api.base_url(), "server not reachable yet, continuing");
    }

    let mut logged_in = false;
    if let Some(username) = config.username.as_deref() {
        let password = cli
            .password
            .context("a username is configured but no password was supplied")?;
        if api
            .login(username, &password)
            .await
            .context("login request failed")?
        {
            categories.refresh().await;
            logged_in = true;
        } else {
            anyhow::bail!("login rejected for user {username}");
        }
    } else {
        warn!("no username configured, running unauthenticated");
    }

    let mut current = api.load_paths().await;
    let started = watch.start_all(current.clone()).await;
    info!(
        paths = current.len(),
        handles = started,
        active = watch.is_active().await,
        "monitoring started"
    );

    let refresh_interval = config.refresh_interval();
    tokio::select! {
        _ = refresh_loop(&api, &watch, &mut current, refresh_interval) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    watch.stop_all().await;
    if logged_in {
        categories.invalidate().await;
        api.logout().await;
    }
    info!("monitoring stopped");
    Ok(())
}

/// Re-read the path registry on an interval and rebuild the watch set when
/// the snapshot changed. An empty snapshot after a non-empty one is treated
/// as a failed load and leaves the running watches untouched.
async fn refresh_loop(
    api: &ApiClient,
    watch: &WatchService,
    current: &mut Vec<MonitoredPath>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let fresh = api.load_paths().await;
        if fresh.is_empty() && !current.is_empty() {
            warn!("path registry came back empty, keeping existing watches");
            continue;
        }
        if fresh != *current {
            let started = watch.start_all(fresh.clone()).await;
            info!(
                paths = fresh.len(),
                handles = started,
                "monitored paths changed, watches rebuilt"
            );
            *current = fresh;
        }
    }
}
