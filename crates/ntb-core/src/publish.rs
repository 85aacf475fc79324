//! Persist-then-broadcast, shared by the conversation, the scheduler and HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use crate::{
    audit::{AuditEvent, AuditLogger},
    broadcast::{Broadcaster, DeliveryReport},
    domain::{Announcement, Attachment, NewAnnouncement, SubscriberId},
    i18n::Localizer,
    messaging::port::MessagingPort,
    scheduler::{JobRunner, ScheduledJob},
    store::AnnouncementStore,
    validation::{validate, AnnouncementInput},
    Result,
};

#[derive(Clone, Debug)]
pub struct Published {
    pub announcement: Announcement,
    pub report: DeliveryReport,
}

pub struct Publisher {
    announcements: Arc<dyn AnnouncementStore>,
    broadcaster: Broadcaster,
    audit: AuditLogger,
}

impl Publisher {
    pub fn new(
        announcements: Arc<dyn AnnouncementStore>,
        broadcaster: Broadcaster,
        audit: AuditLogger,
    ) -> Self {
        Self {
            announcements,
            broadcaster,
            audit,
        }
    }

    /// Persist and fan out. Fails only if persistence fails; delivery problems
    /// end up in the report and never undo the stored record.
    pub async fn publish(&self, new: NewAnnouncement) -> Result<Published> {
        let announcement = self.announcements.create(new, Utc::now()).await?;
        info!(
            announcement = %announcement.id,
            category = announcement.category.tag(),
            created_by = %announcement.created_by,
            "announcement stored"
        );

        let report = match self.broadcaster.broadcast(&announcement).await {
            Ok(r) => r,
            Err(e) => {
                error!(announcement = %announcement.id, error = %e, "broadcast could not start");
                DeliveryReport::default()
            }
        };

        self.audit.record(AuditEvent::published(
            &announcement.created_by,
            announcement.id.0,
            &announcement.title,
            announcement.category.tag(),
            report.attempted,
            report.delivered,
        ));

        Ok(Published {
            announcement,
            report,
        })
    }

    /// Validate raw fields, then [`Publisher::publish`].
    pub async fn publish_input(
        &self,
        input: AnnouncementInput<'_>,
        attachments: Vec<Attachment>,
        created_by: SubscriberId,
    ) -> Result<Published> {
        let new = validate(input, attachments, created_by)?;
        self.publish(new).await
    }
}

/// Publishes due scheduled jobs and tells the requester how it went.
pub struct AnnouncementJobRunner {
    publisher: Arc<Publisher>,
    messenger: Arc<dyn MessagingPort>,
    i18n: Localizer,
    audit: AuditLogger,
}

impl AnnouncementJobRunner {
    pub fn new(
        publisher: Arc<Publisher>,
        messenger: Arc<dyn MessagingPort>,
        i18n: Localizer,
        audit: AuditLogger,
    ) -> Self {
        Self {
            publisher,
            messenger,
            i18n,
            audit,
        }
    }
}

#[async_trait]
impl JobRunner for AnnouncementJobRunner {
    async fn run(&self, job: ScheduledJob) {
        let lang = job.language;
        let notice = match self.publisher.publish(job.announcement.clone()).await {
            Ok(p) => self.i18n.text_with(
                lang,
                "scheduled_sent",
                &[
                    ("title", &p.announcement.title),
                    ("delivered", &p.report.delivered.to_string()),
                    ("attempted", &p.report.attempted.to_string()),
                ],
            ),
            Err(e) => {
                error!(requested_by = %job.requested_by, error = %e, "scheduled announcement failed");
                self.audit.record(AuditEvent::error(
                    &job.requested_by,
                    &e.to_string(),
                    Some("scheduled_job"),
                ));
                self.i18n
                    .text_with(lang, "scheduled_failed", &[("error", &e.to_string())])
            }
        };

        if let Err(e) = self
            .messenger
            .send_text(&job.requested_by, &notice, false)
            .await
        {
            error!(requested_by = %job.requested_by, error = %e, "failed to notify requester");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broadcast::BroadcastConfig,
        directory::SubscriberDirectory,
        domain::{Category, Language},
        errors::{Error, ValidationError},
        store::MemoryStore,
        testing::{test_config, FakeMessenger},
    };
    use std::time::Duration;

    fn publisher(store: Arc<MemoryStore>, fake: Arc<FakeMessenger>) -> Arc<Publisher> {
        let cfg = test_config();
        let broadcaster = Broadcaster::new(
            SubscriberDirectory::new(store.clone()),
            fake,
            Localizer::default(),
            BroadcastConfig {
                delivery_timeout: Duration::from_millis(200),
                concurrency: 2,
            },
        );
        Arc::new(Publisher::new(
            store,
            broadcaster,
            AuditLogger::new(cfg.audit_log_path, true),
        ))
    }

    #[tokio::test]
    async fn invalid_input_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let p = publisher(store.clone(), Arc::new(FakeMessenger::default()));

        let err = p
            .publish_input(
                AnnouncementInput {
                    title: Some("Hi"),
                    body: Some("Long enough body text."),
                    tag: Some("tech"),
                },
                vec![],
                SubscriberId::new("1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TitleTooShort)
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delivery_failures_keep_the_record() {
        let store = Arc::new(MemoryStore::new());
        let fake = Arc::new(FakeMessenger::default());
        SubscriberDirectory::new(store.clone())
            .upsert_on_interaction(&SubscriberId::new("9"), None)
            .await
            .unwrap();
        fake.fail_for("9");

        let publisher = publisher(store.clone(), fake);
        let published = publisher
            .publish(NewAnnouncement {
                title: "Closed".to_string(),
                body: "Library closed all day.".to_string(),
                category: Category::General,
                attachments: vec![],
                created_by: SubscriberId::new("1"),
            })
            .await
            .unwrap();
        assert_eq!(published.report.failed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn job_runner_publishes_and_notifies_requester() {
        let store = Arc::new(MemoryStore::new());
        let fake = Arc::new(FakeMessenger::default());
        let runner = AnnouncementJobRunner::new(
            publisher(store.clone(), fake.clone()),
            fake.clone(),
            Localizer::default(),
            AuditLogger::new(test_config().audit_log_path, true),
        );

        runner
            .run(ScheduledJob {
                due_at: Utc::now(),
                requested_by: SubscriberId::new("1"),
                language: Language::En,
                announcement: NewAnnouncement {
                    title: "Fair".to_string(),
                    body: "Career fair on Monday.".to_string(),
                    category: Category::Events,
                    attachments: vec![],
                    created_by: SubscriberId::new("1"),
                },
            })
            .await;

        assert_eq!(store.count().await.unwrap(), 1);
        let notices = fake.texts_to(&SubscriberId::new("1"));
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("\"Fair\" was published"));
    }
}
