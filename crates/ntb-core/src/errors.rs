/// Reasons a draft or HTTP payload cannot become an announcement.
///
/// The `Display` strings are shown to the initiator verbatim.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Title must be at least 3 characters long")]
    TitleTooShort,

    #[error("Message must be at least 10 characters long")]
    BodyTooShort,

    #[error("Invalid tag selected")]
    InvalidCategory,
}

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot core can
/// decide between a user-facing message and a generic failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
