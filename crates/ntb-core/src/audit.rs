//! Append-only audit log of administrative actions.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::SubscriberId, errors::Error, formatting::truncate_text, Result};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcement_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, actor: &SubscriberId) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            actor: Some(actor.to_string()),
            subject: None,
            announcement_id: None,
            title: None,
            category: None,
            attempted: None,
            delivered: None,
            due_at: None,
            error: None,
            context: None,
        }
    }

    pub fn published(
        actor: &SubscriberId,
        announcement_id: i64,
        title: &str,
        category: &str,
        attempted: usize,
        delivered: usize,
    ) -> Self {
        Self {
            announcement_id: Some(announcement_id),
            title: Some(title.to_string()),
            category: Some(category.to_string()),
            attempted: Some(attempted),
            delivered: Some(delivered),
            ..Self::base("announcement_published", actor)
        }
    }

    pub fn scheduled(actor: &SubscriberId, title: &str, due_at: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            due_at: Some(due_at.to_string()),
            ..Self::base("announcement_scheduled", actor)
        }
    }

    pub fn deleted(actor: &SubscriberId, announcement_id: i64) -> Self {
        Self {
            announcement_id: Some(announcement_id),
            ..Self::base("announcement_deleted", actor)
        }
    }

    pub fn admin_added(actor: &SubscriberId, subject: &SubscriberId) -> Self {
        Self {
            subject: Some(subject.to_string()),
            ..Self::base("admin_added", actor)
        }
    }

    pub fn admin_removed(actor: &SubscriberId, subject: &SubscriberId) -> Self {
        Self {
            subject: Some(subject.to_string()),
            ..Self::base("admin_removed", actor)
        }
    }

    pub fn error(actor: &SubscriberId, error: &str, context: Option<&str>) -> Self {
        Self {
            error: Some(error.to_string()),
            context: context.map(|s| s.to_string()),
            ..Self::base("error", actor)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.title {
            event.title = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.error {
            event.error = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Write and log instead of propagating; the audited action already happened.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.write(event) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write audit event");
        }
    }
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}
