//! Static localized strings keyed by (language, key).
//!
//! Tables are bundled at compile time from `locales/*.json` and parsed once.

use std::{collections::HashMap, sync::OnceLock};

use crate::domain::{Category, Language};

type Table = HashMap<String, String>;

static TABLES: OnceLock<HashMap<Language, Table>> = OnceLock::new();

fn tables() -> &'static HashMap<Language, Table> {
    TABLES.get_or_init(|| {
        let mut out = HashMap::new();
        for (lang, raw) in [
            (Language::En, include_str!("../locales/en.json")),
            (Language::Fr, include_str!("../locales/fr.json")),
            (Language::Ar, include_str!("../locales/ar.json")),
        ] {
            let table: Table = match serde_json::from_str(raw) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(lang = lang.code(), error = %e, "failed to parse locale table");
                    Table::new()
                }
            };
            out.insert(lang, table);
        }
        out
    })
}

/// Localized string lookup with a configurable fallback language.
#[derive(Clone, Copy, Debug)]
pub struct Localizer {
    fallback: Language,
}

impl Default for Localizer {
    fn default() -> Self {
        Self::new(Language::En)
    }
}

impl Localizer {
    pub fn new(fallback: Language) -> Self {
        Self { fallback }
    }

    pub fn fallback(&self) -> Language {
        self.fallback
    }

    /// Look up `key` in `lang`, then in the fallback language, then English.
    /// An unknown key yields the key itself so a missing string is visible but harmless.
    pub fn text(&self, lang: Language, key: &str) -> String {
        let t = tables();
        [lang, self.fallback, Language::En]
            .iter()
            .find_map(|l| t.get(l).and_then(|table| table.get(key)))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Like [`Localizer::text`], substituting `{name}` placeholders.
    pub fn text_with(&self, lang: Language, key: &str, vars: &[(&str, &str)]) -> String {
        let mut out = self.text(lang, key);
        for (name, value) in vars {
            out = out.replace(&format!("{{{name}}}"), value);
        }
        out
    }

    pub fn category_label(&self, lang: Language, category: Category) -> String {
        self.text(lang, &format!("category_{}", category.tag()))
    }
}
