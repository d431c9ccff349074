//! pnntprss — republishes RSS/Atom feeds as read-only NNTP newsgroups.
//!
//! See `SPEC_FULL.md` in the repository root for the full system design; the
//! module layout below follows it one-to-one.

/// Process-wide settings threaded explicitly into every other component.
pub mod config;
/// Entry-identity derivation (message-id digests).
pub mod digest;
/// Error taxonomy shared by every component.
pub mod error;
/// Feed fetching and RSS/Atom parsing, normalised behind `FeedSource`.
pub mod feed;
/// English-interval codec (durations in seconds ⇄ human-readable strings).
pub mod interval;
/// Process-wide `tracing` subscriber init, writing to the on-disk log file.
pub mod logging;
/// Stale-tolerant, filesystem-backed advisory lock.
pub mod lock;
/// Entry → RFC 5322/MIME message rendering and wire-level framing.
pub mod message;
/// Single-group ingest state machine.
pub mod poller;
/// Process-wide poll orchestration.
pub mod scheduler;
/// Read-only NNTP session state machine and TCP server.
pub mod server;
/// Per-group on-disk store: config, index, and numbered article records.
pub mod store;
/// 9-field struct-time value compared structurally.
pub mod time;

pub use config::Settings;
pub use error::{BridgeError, Result};
pub use feed::{FeedDocument, FeedSource, HttpFeedSource};
pub use lock::GroupLock;
pub use store::{Group, GroupConfig, GroupStore};
