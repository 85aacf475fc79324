//! One-shot, in-process scheduling of announcement publication.
//!
//! Jobs carry an explicit payload (the validated announcement plus who asked
//! for it) and are handed to a [`JobRunner`] when due. Nothing is persisted:
//! pending jobs are lost if the process exits.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{Language, NewAnnouncement, SubscriberId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub due_at: DateTime<Utc>,
    pub requested_by: SubscriberId,
    /// Language of the requester, for the completion notice.
    pub language: Language,
    pub announcement: NewAnnouncement,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingJob {
    pub id: u64,
    pub job: ScheduledJob,
}

/// Executes a job once it is due.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: ScheduledJob);
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    runner: Arc<dyn JobRunner>,
    pending: Mutex<BTreeMap<u64, ScheduledJob>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                runner,
                pending: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Register `job` to run at `job.due_at`. A due time in the past runs immediately.
    pub async fn schedule_at(&self, job: ScheduledJob) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let wait = (job.due_at - Utc::now()).to_std().unwrap_or_default();
        self.inner.pending.lock().await.insert(id, job);
        info!(job = id, wait_secs = wait.as_secs(), "announcement scheduled");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            let Some(job) = inner.pending.lock().await.remove(&id) else {
                warn!(job = id, "scheduled job vanished before firing");
                return;
            };
            info!(job = id, requested_by = %job.requested_by, "running scheduled announcement");
            inner.runner.run(job).await;
        });
        id
    }

    /// Pending jobs, earliest first.
    pub async fn pending(&self) -> Vec<PendingJob> {
        let mut jobs: Vec<PendingJob> = self
            .inner
            .pending
            .lock()
            .await
            .iter()
            .map(|(id, job)| PendingJob {
                id: *id,
                job: job.clone(),
            })
            .collect();
        jobs.sort_by_key(|p| (p.job.due_at, p.id));
        jobs
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Stop all timers. Pending jobs are dropped.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleInputError {
    #[error("unrecognized date/time: {0}")]
    Invalid(String),

    #[error("date/time is not in the future: {0}")]
    NotInFuture(String),
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a publication time typed by an admin.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (space or `T`) and a bare
/// `YYYY-MM-DD` (midnight). Naive inputs are server-local time; an ambiguous
/// local time resolves to the earlier instant, a nonexistent one is rejected.
pub fn parse_schedule_input(
    input: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleInputError> {
    let s = input.trim();
    let invalid = || ScheduleInputError::Invalid(s.to_string());

    let instant = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        dt.with_timezone(&Utc)
    } else {
        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(invalid)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(invalid)?
            .with_timezone(&Utc)
    };

    if instant <= now {
        return Err(ScheduleInputError::NotInFuture(s.to_string()));
    }
    Ok(instant)
}
