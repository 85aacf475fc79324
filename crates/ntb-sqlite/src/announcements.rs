use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension};

use ntb_core::domain::{
    Announcement, AnnouncementId, Attachment, AttachmentKind, Category, NewAnnouncement,
    SubscriberId,
};

use crate::database::Database;
use crate::error::Result;
use crate::rows::{decode_text, decode_ts, encode_ts};

const COLUMNS: &str = "id, title, body, category, created_by, created_at";

impl Database {
    /// Insert the announcement and its attachments atomically.
    pub fn insert_announcement(
        &mut self,
        new: &NewAnnouncement,
        now: DateTime<Utc>,
    ) -> Result<Announcement> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO announcements (title, body, category, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.title,
                new.body,
                new.category.tag(),
                new.created_by.as_str(),
                encode_ts(now),
            ],
        )?;
        let id = tx.last_insert_rowid();

        for (position, att) in new.attachments.iter().enumerate() {
            tx.execute(
                "INSERT INTO announcement_attachments (announcement_id, position, kind, file_ref)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, position as i64, att.kind.as_str(), att.file_ref],
            )?;
        }
        tx.commit()?;

        Ok(Announcement {
            id: AnnouncementId(id),
            title: new.title.clone(),
            body: new.body.clone(),
            category: new.category,
            attachments: new.attachments.clone(),
            created_by: new.created_by.clone(),
            created_at: now,
        })
    }

    pub fn get_announcement(&self, id: AnnouncementId) -> Result<Option<Announcement>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM announcements WHERE id = ?1"),
                params![id.0],
                row_to_announcement,
            )
            .optional()?;
        match row {
            Some(mut a) => {
                a.attachments = self.attachments_of(a.id)?;
                Ok(Some(a))
            }
            None => Ok(None),
        }
    }

    pub fn recent_announcements(&self, skip: usize, limit: usize) -> Result<Vec<Announcement>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM announcements
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit as i64, skip as i64], row_to_announcement)?;
        self.collect_with_attachments(rows)
    }

    pub fn count_announcements(&self) -> Result<u64> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM announcements", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Attachments go with it (`ON DELETE CASCADE`).
    pub fn delete_announcement(&self, id: AnnouncementId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM announcements WHERE id = ?1", params![id.0])?;
        Ok(affected > 0)
    }

    /// Case-insensitive (ASCII) substring match over title and body.
    pub fn search_announcements(
        &self,
        term: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Announcement>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM announcements
             WHERE fold(title) LIKE ?1 ESCAPE '\\' OR fold(body) LIKE ?1 ESCAPE '\\'
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![like_pattern(term), limit as i64, skip as i64],
            row_to_announcement,
        )?;
        self.collect_with_attachments(rows)
    }

    pub fn count_search(&self, term: &str) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM announcements
             WHERE fold(title) LIKE ?1 ESCAPE '\\' OR fold(body) LIKE ?1 ESCAPE '\\'",
            params![like_pattern(term)],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn attachments_of(&self, id: AnnouncementId) -> Result<Vec<Attachment>> {
        let mut stmt = self.conn().prepare(
            "SELECT kind, file_ref FROM announcement_attachments
             WHERE announcement_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            let kind: String = row.get(0)?;
            Ok(Attachment {
                kind: decode_text::<AttachmentKind>(0, &kind)?,
                file_ref: row.get(1)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn collect_with_attachments<I>(&self, rows: I) -> Result<Vec<Announcement>>
    where
        I: Iterator<Item = rusqlite::Result<Announcement>>,
    {
        let mut out = Vec::new();
        for row in rows {
            let mut a = row?;
            a.attachments = self.attachments_of(a.id)?;
            out.push(a);
        }
        Ok(out)
    }
}

/// Case-folded `LIKE` pattern; match it against `fold(column)`.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn row_to_announcement(row: &rusqlite::Row<'_>) -> rusqlite::Result<Announcement> {
    let id: i64 = row.get(0)?;
    let category: String = row.get(3)?;
    let created_by: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    let category = Category::from_tag(&category).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown category: {category}").into(),
        )
    })?;

    Ok(Announcement {
        id: AnnouncementId(id),
        title: row.get(1)?,
        body: row.get(2)?,
        category,
        attachments: Vec::new(),
        created_by: SubscriberId::new(created_by),
        created_at: decode_ts(5, &created_at)?,
    })
}
