//! Timeline relay bot — binary entrypoint.
//!
//! Wires the store, the source timeline client and the Telegram client
//! together, then runs three loops: fetch cycles, dispatch cycles, and
//! the command front-end. Ctrl-C (or /terminate) lets each loop finish
//! its in-flight cycle before stopping.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use timeline_relay::commands::CommandFrontEnd;
use timeline_relay::config;
use timeline_relay::source::{HttpTimeline, SourceTimeline};
use timeline_relay::telegram::TelegramClient;
use timeline_relay::{Dispatcher, Fetcher, Store, SubscriptionManager};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("timeline_relay=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Startup failures are fatal: no config or no store means no bot.
    let cfg = config::load_default().context("loading config")?;
    let store = Arc::new(Store::open(&cfg.store.path).context("opening store")?);

    let source: Arc<dyn SourceTimeline> = Arc::new(
        HttpTimeline::new(
            cfg.source.base_url.clone(),
            cfg.source.bearer_token.clone(),
            cfg.source.user_id.clone(),
        )
        .with_timeout(cfg.schedule.send_timeout_secs.max(10)),
    );
    let telegram = Arc::new(
        TelegramClient::new(cfg.telegram.token.clone())
            .with_timeout(cfg.schedule.send_timeout_secs),
    );

    let fetcher = Arc::new(Fetcher::new(source.clone(), store.clone()).context("seeding cursor")?);
    let dispatcher = Arc::new(Dispatcher::new(telegram.clone(), store.clone()));
    let subscriptions = SubscriptionManager::new(store.clone(), fetcher.cursor());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Ctrl-C flips the same flag /terminate does.
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let fetch_loop = {
        let fetcher = fetcher.clone();
        let mut shutdown = shutdown_rx.clone();
        let interval = Duration::from_secs(cfg.schedule.fetch_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = fetcher.run_fetch_cycle().await {
                            tracing::warn!(error = %format!("{e:#}"), "fetch cycle failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("fetch loop stopped");
        })
    };

    let dispatch_loop = {
        let dispatcher = dispatcher.clone();
        let mut shutdown = shutdown_rx.clone();
        let interval = Duration::from_secs(cfg.schedule.dispatch_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = dispatcher.run_dispatch_cycle().await {
                            tracing::warn!(error = %format!("{e:#}"), "dispatch cycle failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("dispatch loop stopped");
        })
    };

    let command_loop = {
        let front_end = CommandFrontEnd::new(
            telegram,
            subscriptions,
            source,
            cfg.telegram.admins.clone(),
            cfg.telegram.allowed_chat_id,
            shutdown_tx,
        );
        let shutdown = shutdown_rx;
        tokio::spawn(async move { front_end.run(shutdown).await })
    };

    tracing::info!(
        fetch_secs = cfg.schedule.fetch_interval_secs,
        dispatch_secs = cfg.schedule.dispatch_interval_secs,
        "timeline-relay started"
    );

    let _ = tokio::join!(fetch_loop, dispatch_loop, command_loop);
    tracing::info!("timeline-relay stopped");
    Ok(())
}
