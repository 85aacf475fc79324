use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{Language, SubscriberId},
    errors::Error,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite(PathBuf),
    Memory,
}

/// Typed configuration, loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub admin_ids: Vec<SubscriberId>,
    pub default_language: Language,

    // Storage
    pub store: StoreBackend,

    // HTTP ingress
    pub http_enabled: bool,
    pub http_bind: SocketAddr,
    pub http_author_id: SubscriberId,

    // Broadcast
    pub delivery_timeout: Duration,
    pub broadcast_concurrency: usize,

    // Listing / stats
    pub recent_page_size: usize,
    pub active_window: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_ids = parse_csv_ids(env_str("ADMIN_TELEGRAM_IDS"));

        let default_language = match env_str("DEFAULT_LANGUAGE").and_then(non_empty) {
            Some(code) => code.parse::<Language>().map_err(Error::Config)?,
            None => Language::En,
        };

        let store = match env_str("STORE_BACKEND")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("sqlite") => StoreBackend::Sqlite(PathBuf::from(
                env_str("DATABASE_PATH").unwrap_or("ntb.db".to_string()),
            )),
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(Error::Config(format!(
                    "STORE_BACKEND must be `sqlite` or `memory`, got `{other}`"
                )))
            }
        };

        let http_enabled = env_bool("HTTP_ENABLED").unwrap_or(true);
        let port = env_u64("PORT").unwrap_or(3000);
        let bind_raw = env_str("HTTP_BIND")
            .and_then(non_empty)
            .unwrap_or_else(|| format!("0.0.0.0:{port}"));
        let http_bind = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("HTTP_BIND `{bind_raw}` is invalid: {e}")))?;
        let http_author_id = SubscriberId::new(
            env_str("HTTP_AUTHOR_ID")
                .and_then(non_empty)
                .unwrap_or("http-api".to_string()),
        );

        let delivery_timeout =
            Duration::from_millis(env_u64("DELIVERY_TIMEOUT_MS").unwrap_or(10_000));
        let broadcast_concurrency = env_usize("BROADCAST_CONCURRENCY").unwrap_or(8).max(1);

        let recent_page_size = env_usize("RECENT_PAGE_SIZE").unwrap_or(5).clamp(1, 20);
        let active_window =
            Duration::from_secs(env_u64("ACTIVE_WINDOW_HOURS").unwrap_or(24) * 3600);

        let audit_log_path = PathBuf::from(
            env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/ntb-audit.log".to_string()),
        );
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            default_language,
            store,
            http_enabled,
            http_bind,
            http_author_id,
            delivery_timeout,
            broadcast_concurrency,
            recent_page_size,
            active_window,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

pub(crate) fn parse_csv_ids(v: Option<String>) -> Vec<SubscriberId> {
    let mut out: Vec<SubscriberId> = Vec::new();
    for id in v
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        let id = SubscriberId::new(id);
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_ids_are_trimmed_and_deduplicated() {
        let ids = parse_csv_ids(Some(" 1, 2,,1 ,3".to_string()));
        assert_eq!(
            ids,
            vec![
                SubscriberId::new("1"),
                SubscriberId::new("2"),
                SubscriberId::new("3")
            ]
        );
        assert!(parse_csv_ids(None).is_empty());
    }

    #[test]
    fn quotes_are_stripped_from_dotenv_values() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("abc"), "abc");
        assert_eq!(strip_quotes("\""), "\"");
    }
}
