//! Wiring of the core services over a store and a messenger.

use std::sync::Arc;

use crate::{
    admin::AdminPolicy,
    audit::AuditLogger,
    broadcast::{BroadcastConfig, Broadcaster},
    config::Config,
    directory::SubscriberDirectory,
    i18n::Localizer,
    messaging::port::MessagingPort,
    publish::{AnnouncementJobRunner, Publisher},
    scheduler::Scheduler,
    store::{AnnouncementStore, SubscriberStore},
};

/// Everything the dispatcher and the HTTP ingress share.
#[derive(Clone)]
pub struct Services {
    pub cfg: Arc<Config>,
    pub i18n: Localizer,
    pub directory: SubscriberDirectory,
    pub admin: Arc<AdminPolicy>,
    pub announcements: Arc<dyn AnnouncementStore>,
    pub publisher: Arc<Publisher>,
    pub scheduler: Scheduler,
    pub messenger: Arc<dyn MessagingPort>,
    pub audit: AuditLogger,
}

impl Services {
    pub fn new(
        cfg: Arc<Config>,
        subscribers: Arc<dyn SubscriberStore>,
        announcements: Arc<dyn AnnouncementStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let i18n = Localizer::new(cfg.default_language);
        let audit = AuditLogger::new(cfg.audit_log_path.clone(), cfg.audit_log_json);
        let directory = SubscriberDirectory::new(subscribers);
        let admin = Arc::new(AdminPolicy::new(directory.clone(), cfg.admin_ids.clone()));

        let broadcaster = Broadcaster::new(
            directory.clone(),
            Arc::clone(&messenger),
            i18n,
            BroadcastConfig {
                delivery_timeout: cfg.delivery_timeout,
                concurrency: cfg.broadcast_concurrency,
            },
        );
        let publisher = Arc::new(Publisher::new(
            Arc::clone(&announcements),
            broadcaster,
            audit.clone(),
        ));
        let scheduler = Scheduler::new(Arc::new(AnnouncementJobRunner::new(
            Arc::clone(&publisher),
            Arc::clone(&messenger),
            i18n,
            audit.clone(),
        )));

        Self {
            cfg,
            i18n,
            directory,
            admin,
            announcements,
            publisher,
            scheduler,
            messenger,
            audit,
        }
    }
}
