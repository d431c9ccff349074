//! Process-wide settings, loaded once and threaded explicitly into every component.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the scheduler, poller, store, and NNTP session.
///
/// `Settings` is constructed once at process start (from CLI flags, falling back to
/// the defaults below) and passed down explicitly — nothing in this crate reads
/// configuration from a global or a `OnceLock`.
///
/// # Example
///
/// ```
/// use pnntprss::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.feed_poll_interval, 1800);
/// assert_eq!(settings.feed_poll_concurrency, 4);
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for all Bridge state, default `$HOME/.pnntprss`.
    pub base_dir: PathBuf,

    /// Directory holding one subdirectory per group, default `<base_dir>/groups`.
    pub groups_dir: PathBuf,

    /// Default poll period for a group that does not override `interval`, in seconds.
    pub feed_poll_interval: u64,

    /// Default article lifetime; `None` means articles never expire.
    pub article_lifetime: Option<u64>,

    /// `User-Agent` sent with every feed fetch.
    pub user_agent: String,

    /// Maximum number of groups polled concurrently by the scheduler.
    pub feed_poll_concurrency: usize,

    /// How long a lock file is considered held by a live process, in seconds.
    pub lock_expiry: Duration,

    /// Socket timeout applied to feed fetches, in seconds.
    pub socket_timeout: Duration,

    /// Address the NNTP server listens on.
    pub nntp_addr: SocketAddr,
}

impl Settings {
    /// Build settings rooted at an explicit base directory, keeping every other default.
    ///
    /// # Example
    ///
    /// ```
    /// use pnntprss::Settings;
    /// use std::path::Path;
    ///
    /// let settings = Settings::with_base_dir("/tmp/pnntprss-example");
    /// assert_eq!(settings.groups_dir, Path::new("/tmp/pnntprss-example/groups"));
    /// ```
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let groups_dir = base_dir.join("groups");
        Self {
            base_dir,
            groups_dir,
            ..Self::default()
        }
    }

    /// Path to the process-wide scheduler lock.
    pub fn update_lock_path(&self) -> PathBuf {
        self.groups_dir.join("update.lock")
    }

    /// Path to the process-wide log file, per the on-disk layout contract.
    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join("log")
    }
}

impl Default for Settings {
    fn default() -> Self {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pnntprss");
        let groups_dir = base_dir.join("groups");
        Self {
            base_dir,
            groups_dir,
            feed_poll_interval: 1800,
            article_lifetime: None,
            user_agent: concat!("pnntprss/", env!("CARGO_PKG_VERSION")).to_string(),
            feed_poll_concurrency: 4,
            lock_expiry: Duration::from_secs(30 * 60),
            socket_timeout: Duration::from_secs(20),
            nntp_addr: "0.0.0.0:4321".parse().expect("literal address is valid"),
        }
    }
}
