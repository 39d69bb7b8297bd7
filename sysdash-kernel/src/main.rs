/**
 * SYSDASH KERNEL - Entry point of the dashboard state engine
 *
 * ROLE: wires config, host probes, the state store, the broadcast hub, the
 * scheduler and the HTTP/WebSocket surface, then serves until Ctrl-C.
 *
 * EXIT: 0 on graceful shutdown, non-zero when no port could be bound.
 */

mod alerts;
mod collector;
mod config;
mod error;
mod health;
mod http;
mod hub;
mod models;
mod scheduler;
mod state;
mod ws;

use anyhow::Context;
use sysdash_probe::inventory::default_source;
use sysdash_probe::{HostIdentity, MetricSampler, ProcessInventory};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::AlertRules;
use crate::collector::HostCollector;
use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::hub::BroadcastHub;
use crate::scheduler::Scheduler;
use crate::state::StateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sysdash_kernel=info,sysdash_probe=info")),
        )
        .init();

    let cfg = load_config().await;

    let identity = HostIdentity::discover();
    let hub = BroadcastHub::new(cfg.limits.subscriber_queue);
    let store = StateStore::seeded(hub, &cfg.limits, &identity);
    let health = HealthTracker::new();

    // host probes
    let sampler = MetricSampler::new(cfg.schedule.cpu_window(), cfg.probe.target.clone(), cfg.probe.timeout());
    let inventory = ProcessInventory::new(
        default_source(),
        cfg.inventory.max_processes,
        cfg.inventory.include_unclassified,
    );
    let collector = HostCollector::new(sampler, inventory);

    let scheduler = Scheduler::new(
        store.clone(),
        Box::new(collector),
        AlertRules::from(&cfg.alerts),
        health.clone(),
        &cfg.schedule,
    );
    let loops = scheduler.spawn_loops();

    let app = http::build_router(AppState { store, scheduler, health });

    let listener = http::bind_with_retry(&cfg.server.host, cfg.server.port)
        .await
        .context("no usable port for the dashboard")?;
    let addr = listener.local_addr()?;
    info!("dashboard listening on http://{addr}");
    info!("websocket subscriptions on ws://{addr}/ws");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    for handle in loops {
        handle.abort();
    }
    info!("dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
