//! Fan-out of a persisted announcement to every subscriber.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, warn};

use crate::{
    directory::SubscriberDirectory,
    domain::{Announcement, AttachmentKind, Subscriber, SubscriberId},
    errors::Error,
    formatting::{attachment_caption, render_announcement},
    i18n::Localizer,
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub subscriber: SubscriberId,
    pub error: String,
}

/// Aggregate outcome of one broadcast. Every subscriber is counted exactly once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    fn record(&mut self, outcome: SubscriberOutcome) {
        self.attempted += 1;
        if outcome.errors.is_empty() {
            self.delivered += 1;
        } else {
            self.failed += 1;
            self.failures.push(DeliveryFailure {
                subscriber: outcome.subscriber,
                error: outcome.errors.join("; "),
            });
        }
    }
}

#[derive(Debug)]
struct SubscriberOutcome {
    subscriber: SubscriberId,
    errors: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct BroadcastConfig {
    /// Upper bound for each individual transport call.
    pub delivery_timeout: Duration,
    /// Subscribers served in parallel.
    pub concurrency: usize,
}

#[derive(Clone)]
pub struct Broadcaster {
    directory: SubscriberDirectory,
    messenger: Arc<dyn MessagingPort>,
    i18n: Localizer,
    cfg: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(
        directory: SubscriberDirectory,
        messenger: Arc<dyn MessagingPort>,
        i18n: Localizer,
        cfg: BroadcastConfig,
    ) -> Self {
        Self {
            directory,
            messenger,
            i18n,
            cfg,
        }
    }

    /// Deliver `announcement` to all current subscribers.
    ///
    /// Only the subscriber scan can fail; per-subscriber delivery errors are
    /// logged and folded into the report. No dedup across calls.
    pub async fn broadcast(&self, announcement: &Announcement) -> Result<DeliveryReport> {
        let subscribers = self.directory.all().await?;
        let announcement = Arc::new(announcement.clone());
        let permits = Arc::new(Semaphore::new(self.cfg.concurrency.max(1)));

        let mut tasks = JoinSet::new();
        let mut task_owner = HashMap::new();
        for sub in subscribers {
            let id = sub.id.clone();
            let ctx = self.clone();
            let announcement = Arc::clone(&announcement);
            let permits = Arc::clone(&permits);
            let handle = tasks.spawn(async move {
                // The semaphore is never closed; a failed acquire just means no bound.
                let _permit = permits.acquire_owned().await.ok();
                ctx.deliver_to(sub, &announcement).await
            });
            task_owner.insert(handle.id(), id);
        }

        let mut report = DeliveryReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    let subscriber = task_owner
                        .remove(&e.id())
                        .unwrap_or_else(|| SubscriberId::new("unknown"));
                    warn!(subscriber = %subscriber, error = %e, "delivery task aborted");
                    report.record(SubscriberOutcome {
                        subscriber,
                        errors: vec![format!("delivery task aborted: {e}")],
                    });
                }
            }
        }

        info!(
            announcement = %announcement.id,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast finished"
        );
        Ok(report)
    }

    async fn deliver_to(&self, sub: Subscriber, a: &Announcement) -> SubscriberOutcome {
        let mut errors = Vec::new();
        let caps = self.messenger.capabilities();

        for part in render_announcement(&self.i18n, sub.language, a, caps.max_message_len) {
            if let Err(e) = self
                .bounded(self.messenger.send_text(&sub.id, &part, true))
                .await
            {
                warn!(subscriber = %sub.id, announcement = %a.id, error = %e, "failed to deliver announcement text");
                errors.push(format!("text: {e}"));
                return SubscriberOutcome {
                    subscriber: sub.id,
                    errors,
                };
            }
        }

        let caption = attachment_caption(&self.i18n, sub.language, a, caps.max_caption_len);
        for att in &a.attachments {
            let kind = match att.kind {
                AttachmentKind::Video if !caps.supports_video => AttachmentKind::Document,
                k => k,
            };
            let sent = self
                .bounded(
                    self.messenger
                        .send_attachment(&sub.id, kind, &att.file_ref, Some(&caption)),
                )
                .await;
            if let Err(e) = sent {
                warn!(
                    subscriber = %sub.id,
                    announcement = %a.id,
                    kind = att.kind.as_str(),
                    error = %e,
                    "failed to deliver attachment"
                );
                errors.push(format!("{}: {e}", att.kind.as_str()));
            }
        }

        SubscriberOutcome {
            subscriber: sub.id,
            errors,
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let limit = self.cfg.delivery_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(res) => res,
            Err(_) => Err(Error::Transport(format!(
                "timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }
}
