use std::sync::Arc;

use anyhow::Context;
use teloxide::Bot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ntb_core::{
    config::{Config, StoreBackend},
    dispatch::EventDispatcher,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    services::Services,
    store::{AnnouncementStore, MemoryStore, SubscriberStore},
};
use ntb_sqlite::SqliteStore;
use ntb_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ntb_core::logging::init("ntb")?;

    let cfg = Arc::new(Config::load()?);

    let (subscribers, announcements) = open_stores(&cfg.store)?;

    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Throttle in front of the raw adapter; the adapter still retries a RetryAfter once.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let services = Services::new(cfg.clone(), subscribers, announcements, messenger.clone());
    let promoted = services.admin.bootstrap().await?;
    info!(
        configured = cfg.admin_ids.len(),
        promoted, "admin allow-list applied"
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        });
    }

    let http = if cfg.http_enabled {
        let services = services.clone();
        let bind = cfg.http_bind;
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = ntb_http::serve(services, bind, shutdown.clone()).await {
                error!(error = %e, "http ingress failed");
                shutdown.cancel();
            }
        }))
    } else {
        None
    };

    let scheduler = services.scheduler.clone();
    let dispatcher = Arc::new(EventDispatcher::new(services));
    let polled =
        ntb_telegram::router::run_polling(bot, dispatcher, messenger, shutdown.clone()).await;

    shutdown.cancel();
    let pending = scheduler.pending_count().await;
    if pending > 0 {
        info!(pending, "dropping pending scheduled announcements");
    }
    scheduler.shutdown();
    if let Some(handle) = http {
        join_logged("http ingress", handle).await;
    }

    polled
}

/// Await a background task; a panic is logged rather than dropped.
async fn join_logged(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(task = name, error = %e, "background task failed");
            false
        }
    }
}

fn open_stores(
    backend: &StoreBackend,
) -> anyhow::Result<(Arc<dyn SubscriberStore>, Arc<dyn AnnouncementStore>)> {
    match backend {
        StoreBackend::Sqlite(path) => {
            let store = Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("failed to open store at {}", path.display()))?,
            );
            info!(path = %path.display(), "using sqlite store");
            let subscribers: Arc<dyn SubscriberStore> = store.clone();
            let announcements: Arc<dyn AnnouncementStore> = store;
            Ok((subscribers, announcements))
        }
        StoreBackend::Memory => {
            info!("using in-memory store; data is lost on exit");
            let store = Arc::new(MemoryStore::new());
            let subscribers: Arc<dyn SubscriberStore> = store.clone();
            let announcements: Arc<dyn AnnouncementStore> = store;
            Ok((subscribers, announcements))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_logged_reports_panics() {
        assert!(join_logged("ok", tokio::spawn(async {})).await);
        let failed = tokio::spawn(async { panic!("boom") });
        assert!(!join_logged("boom", failed).await);
    }
}
