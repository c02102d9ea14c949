//! Survey Pulse — Binary Entrypoint
//! Wires the poll scheduler, the read-only dashboard API, and metrics.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use survey_pulse::api::{self, AppState};
use survey_pulse::config::AppConfig;
use survey_pulse::diff::DiffOptions;
use survey_pulse::fetch::HttpFetcher;
use survey_pulse::metrics::Metrics;
use survey_pulse::notify::{webhook::WebhookSink, StaticSubscriptions};
use survey_pulse::poller::{spawn_poller, Poller, PollerOptions, SnapshotStore};
use survey_pulse::session::{HttpAuthTransport, SessionManager};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("survey_pulse=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("loading configuration")?;
    let metrics = Metrics::init();

    let store = SnapshotStore::new();
    let sessions = SessionManager::new(
        cfg.credentials.clone(),
        Box::new(HttpAuthTransport::new(
            cfg.base_url.clone(),
            cfg.request_timeout,
        )),
    );
    let source = Arc::new(HttpFetcher::new(cfg.base_url.clone(), cfg.request_timeout));

    let subscriptions = StaticSubscriptions::from_env();
    if subscriptions.is_empty() {
        tracing::info!("no subscribers configured, change events will not be delivered");
    }
    let sink = WebhookSink::new(cfg.request_timeout);

    let poller = Poller::new(
        sessions,
        source,
        store.clone(),
        Arc::new(subscriptions),
        Arc::new(sink),
        PollerOptions {
            poll_interval: cfg.poll_interval,
            failure_backoff: cfg.failure_backoff,
            diff: DiffOptions {
                include_quotas: cfg.include_quota_events,
                ..DiffOptions::default()
            },
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_task = spawn_poller(poller, shutdown_rx);

    let router = api::create_router(AppState {
        store: store.clone(),
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "serving dashboard api");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    // Stop the poller at its next state boundary, then wait for it.
    let _ = shutdown_tx.send(true);
    let _ = poll_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
