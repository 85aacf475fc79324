use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable external identity of a subscriber (the Telegram chat id, as a string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for SubscriberId {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

/// Persisted announcement id (generated by the store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnouncementId(pub i64);

impl fmt::Display for AnnouncementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Subscriber,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Subscriber => "subscriber",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "subscriber" | "student" => Ok(Role::Subscriber),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
    Ar,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Fr, Language::Ar];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::Ar => "ar",
        }
    }

    /// Native name shown on the language picker.
    pub fn native_name(self) -> &'static str {
        match self {
            Language::En => "English 🇬🇧",
            Language::Fr => "Français 🇫🇷",
            Language::Ar => "العربية 🇸🇦",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "fr" => Ok(Language::Fr),
            "ar" => Ok(Language::Ar),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// The closed set of announcement tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sports,
    Academic,
    Tech,
    Events,
    General,
    Important,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Sports,
        Category::Academic,
        Category::Tech,
        Category::Events,
        Category::General,
        Category::Important,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Category::Sports => "sports",
            Category::Academic => "academic",
            Category::Tech => "tech",
            Category::Events => "events",
            Category::General => "general",
            Category::Important => "important",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::Sports => "⚽",
            Category::Academic => "📚",
            Category::Tech => "💻",
            Category::Events => "📅",
            Category::General => "📢",
            Category::Important => "⚠️",
        }
    }

    /// Exact, case-sensitive match against the closed set.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Document,
    Video,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Document => "document",
            AttachmentKind::Video => "video",
        }
    }
}

impl FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "photo" => Ok(AttachmentKind::Photo),
            "document" => Ok(AttachmentKind::Document),
            "video" => Ok(AttachmentKind::Video),
            other => Err(format!("unknown attachment kind: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    #[serde(rename = "fileId")]
    pub file_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub display_name: Option<String>,
    pub role: Role,
    pub language: Language,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A validated announcement that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnnouncement {
    pub title: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "tag")]
    pub category: Category,
    pub attachments: Vec<Attachment>,
    #[serde(rename = "createdBy")]
    pub created_by: SubscriberId,
}

/// Persisted announcement. Serializes to the public record shape
/// (`title`, `message`, `tag`, `attachments`, `createdBy`, `createdAt`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: AnnouncementId,
    pub title: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "tag")]
    pub category: Category,
    pub attachments: Vec<Attachment>,
    #[serde(rename = "createdBy")]
    pub created_by: SubscriberId,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}
