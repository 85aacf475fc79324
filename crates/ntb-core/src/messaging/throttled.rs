use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::SubscriberId,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls to the same recipient.
    pub per_recipient_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Telegram: ~30 msg/sec overall, ~1 msg/sec per chat.
        Self {
            global_min_interval: Duration::from_millis(40),
            per_recipient_min_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Entries for recipients not contacted within one interval are dropped once
/// the map holds this many; an expired limiter behaves like a fresh one.
const PRUNE_MIN: usize = 256;

#[derive(Debug)]
struct RecipientLimiters {
    interval: Duration,
    map: HashMap<SubscriberId, IntervalLimiter>,
    prune_at: usize,
}

impl RecipientLimiters {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            map: HashMap::new(),
            prune_at: PRUNE_MIN,
        }
    }

    fn reserve(&mut self, to: &SubscriberId) -> Duration {
        if !self.map.contains_key(to) && self.map.len() >= self.prune_at {
            let now = Instant::now();
            self.map.retain(|_, lim| lim.next > now);
            self.prune_at = (self.map.len() * 2).max(PRUNE_MIN);
        }
        let interval = self.interval;
        self.map
            .entry(to.clone())
            .or_insert_with(|| IntervalLimiter::new(interval))
            .reserve()
    }
}

/// MessagingPort decorator that rate-limits outbound calls.
///
/// Best-effort defense against 429s during broadcasts: it spreads a fan-out
/// over time but does not guarantee the transport never pushes back.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    global: Mutex<IntervalLimiter>,
    per_recipient: Mutex<RecipientLimiters>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_recipient: Mutex::new(RecipientLimiters::new(cfg.per_recipient_min_interval)),
        }
    }

    async fn throttle_recipient(&self, to: &SubscriberId) {
        let global_wait = { self.global.lock().await.reserve() };
        let recipient_wait = { self.per_recipient.lock().await.reserve(to) };

        let wait = global_wait.max(recipient_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_text(&self, to: &SubscriberId, text: &str, rich: bool) -> Result<()> {
        self.throttle_recipient(to).await;
        self.inner.send_text(to, text, rich).await
    }

    async fn send_photo(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.throttle_recipient(to).await;
        self.inner.send_photo(to, file_ref, caption).await
    }

    async fn send_document(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.throttle_recipient(to).await;
        self.inner.send_document(to, file_ref, caption).await
    }

    async fn send_video(
        &self,
        to: &SubscriberId,
        file_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.throttle_recipient(to).await;
        self.inner.send_video(to, file_ref, caption).await
    }

    async fn send_keyboard(
        &self,
        to: &SubscriberId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.throttle_recipient(to).await;
        self.inner.send_keyboard(to, text, keyboard).await
    }

    async fn answer_selection(&self, selection_id: &str, text: Option<&str>) -> Result<()> {
        // No recipient available here; apply global throttling only.
        self.throttle_global().await;
        self.inner.answer_selection(selection_id, text).await
    }
}
