//! Error taxonomy for the Bridge.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Everything that can go wrong while running the Bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Admin command referenced a group that does not exist on disk.
    #[error("no such group: {0}")]
    NoSuchGroup(String),

    /// Admin command tried to create a group whose directory already exists.
    #[error("group already exists: {0}")]
    GroupAlreadyExists(String),

    /// `trylock`/`lock` called while the caller already holds the lock.
    #[error("lock already held")]
    AlreadyHeld,

    /// `touch`/`unlock` called without a prior successful acquisition.
    #[error("lock not held")]
    NotHeld,

    /// Fetching a feed failed at the transport level (no HTTP status available).
    #[error("transport failure fetching {href}: {message}")]
    TransportFailure { href: String, message: String },

    /// The feed parser flagged the document as malformed but an HTTP status was present.
    #[error("feed parse warning for {href} (status {status}): {message}")]
    FeedBozo {
        href: String,
        status: u16,
        message: String,
    },

    /// An interval string did not match `<integer> <unit>` pairs.
    #[error("invalid interval format: {0}")]
    InvalidFormat(String),

    /// A group's config was missing a required `href` at creation time.
    #[error("group config missing required href")]
    MissingHref,

    /// An on-disk record failed to parse as JSON.
    #[error("corrupt record at {path}: {source}")]
    CorruptRecord {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Wrapped filesystem I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped JSON (de)serialisation error outside the context of a specific record path.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapped HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
