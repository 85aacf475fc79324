use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use ntb_core::{
    domain::{Language, Role, Subscriber, SubscriberId},
    store::SubscriberPatch,
};

use crate::database::Database;
use crate::error::Result;
use crate::rows::{decode_text, decode_ts, encode_ts};

const COLUMNS: &str = "id, display_name, role, language, last_active_at, created_at";

impl Database {
    pub fn find_subscriber(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        let sub = self
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM subscribers WHERE id = ?1"),
                params![id.as_str()],
                row_to_subscriber,
            )
            .optional()?;
        Ok(sub)
    }

    /// Read-modify-write inside one transaction.
    pub fn upsert_subscriber(
        &mut self,
        id: &SubscriberId,
        patch: &SubscriberPatch,
        now: DateTime<Utc>,
    ) -> Result<Subscriber> {
        let tx = self.conn_mut().transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {COLUMNS} FROM subscribers WHERE id = ?1"),
                params![id.as_str()],
                row_to_subscriber,
            )
            .optional()?;
        let sub = match existing {
            Some(mut sub) => {
                patch.apply(&mut sub, now);
                sub
            }
            None => patch.create(id.clone(), now),
        };

        tx.execute(
            "INSERT INTO subscribers (id, display_name, role, language, last_active_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                language = excluded.language,
                last_active_at = excluded.last_active_at",
            params![
                sub.id.as_str(),
                sub.display_name,
                sub.role.as_str(),
                sub.language.code(),
                encode_ts(sub.last_active_at),
                encode_ts(sub.created_at),
            ],
        )?;
        tx.commit()?;
        Ok(sub)
    }

    pub fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {COLUMNS} FROM subscribers ORDER BY created_at, id"))?;
        let rows = stmt.query_map([], row_to_subscriber)?;

        let mut subs = Vec::new();
        for row in rows {
            subs.push(row?);
        }
        Ok(subs)
    }

    pub fn count_subscribers_by_role(&self, role: Role) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM subscribers WHERE role = ?1",
            params![role.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn count_subscribers_active_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM subscribers WHERE last_active_at >= ?1",
            params![encode_ts(since)],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn subscribers_by_language(&self) -> Result<Vec<(Language, u64)>> {
        let mut stmt = self.conn().prepare(
            "SELECT language, COUNT(*) FROM subscribers GROUP BY language ORDER BY language",
        )?;
        let rows = stmt.query_map([], |row| {
            let code: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            Ok((decode_text::<Language>(0, &code)?, n as u64))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.sort_by_key(|(lang, _)| *lang);
        Ok(out)
    }
}

fn row_to_subscriber(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscriber> {
    let id: String = row.get(0)?;
    let display_name: Option<String> = row.get(1)?;
    let role: String = row.get(2)?;
    let language: String = row.get(3)?;
    let last_active_at: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(Subscriber {
        id: SubscriberId::new(id),
        display_name,
        role: decode_text::<Role>(2, &role)?,
        language: decode_text::<Language>(3, &language)?,
        last_active_at: decode_ts(4, &last_active_at)?,
        created_at: decode_ts(5, &created_at)?,
    })
}
