//! Per-group, on-disk store: config, index, and numbered article records.
//!
//! Layout: `<groups_dir>/<name>/{config, index, lock, <N>...}`. Every file other than
//! `lock` is written via write-temp-then-rename so readers never observe a half-written
//! record. Only filenames whose first character is a decimal digit are article records.

use std::collections::BTreeMap;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

/// A group's persistent configuration. Recognised keys are typed fields; any other
/// feed-metadata key the Poller absorbs (`title`, `title_detail`, `author`, ...) lives
/// in `feed_meta` via `#[serde(flatten)]` so the record round-trips losslessly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GroupConfig {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastpolled: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_lifetime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_article_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_poll: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_polls: Option<u64>,
    #[serde(flatten)]
    pub feed_meta: Map<String, Value>,
}

/// A loaded, in-memory handle onto one group's directory. All mutating methods write
/// through to disk atomically; `next_article_number` is the exception noted on its
/// own doc comment.
pub struct Group {
    pub name: String,
    dir: PathBuf,
    pub config: GroupConfig,
}

/// Factory for groups under a single `groups_dir`.
pub struct GroupStore {
    groups_dir: PathBuf,
}

impl GroupStore {
    pub fn new(groups_dir: impl Into<PathBuf>) -> Self {
        Self {
            groups_dir: groups_dir.into(),
        }
    }

    /// Create a new group. Fails with `GroupAlreadyExists` if the directory exists,
    /// or `MissingHref` if `initial_config.href` is empty. The directory appears
    /// atomically: it is built in a sibling temp directory and renamed into place.
    pub fn create(&self, name: &str, initial_config: GroupConfig) -> Result<Group> {
        let final_dir = self.groups_dir.join(name);
        if final_dir.exists() {
            return Err(BridgeError::GroupAlreadyExists(name.to_string()));
        }
        if initial_config.href.is_empty() {
            return Err(BridgeError::MissingHref);
        }

        fs::create_dir_all(&self.groups_dir)?;
        let tmp_dir = self.groups_dir.join(format!(".tmp-{name}-{}", unique_suffix()));
        fs::create_dir_all(&tmp_dir)?;
        write_json(&tmp_dir.join("config"), &initial_config)?;
        fs::rename(&tmp_dir, &final_dir)?;

        Ok(Group {
            name: name.to_string(),
            dir: final_dir,
            config: initial_config,
        })
    }

    /// Load an existing group. Fails with `NoSuchGroup` if the directory is missing.
    pub fn load(&self, name: &str) -> Result<Group> {
        let dir = self.groups_dir.join(name);
        let config_path = dir.join("config");
        if !config_path.exists() {
            return Err(BridgeError::NoSuchGroup(name.to_string()));
        }
        let config = read_json(&config_path)?;
        Ok(Group {
            name: name.to_string(),
            dir,
            config,
        })
    }

    /// List every group name present under `groups_dir`.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.groups_dir.exists() {
            return Ok(names);
        }
        for entry in fs::read_dir(&self.groups_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if entry.path().join("config").exists() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn update_lock_path(&self) -> PathBuf {
        self.groups_dir.join("update.lock")
    }
}

impl Group {
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join("lock")
    }

    /// Recursively remove the group's directory. Caller must hold the group lock.
    pub fn delete(self) -> Result<()> {
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// `(lowest, highest, count)` by directory scan.
    pub fn article_range(&self) -> Result<(u64, u64, u64)> {
        let numbers = self.article_file_numbers()?;
        let count = numbers.len() as u64;
        let lowest = numbers
            .iter()
            .min()
            .copied()
            .unwrap_or_else(|| self.config.next_article_number.unwrap_or(1));
        let highest = numbers.iter().max().copied().unwrap_or(lowest.saturating_sub(1));
        Ok((lowest, highest, count))
    }

    /// Load article `n`. Returns `None` if the record does not exist (expired or never written).
    pub fn article(&self, n: u64) -> Result<Option<Value>> {
        let path = self.dir.join(n.to_string());
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json(&path)?))
    }

    /// Article numbers within `range`, ascending, without materialising the full
    /// directory listing before filtering.
    pub fn article_numbers(&self, range: RangeInclusive<u64>) -> Result<Vec<u64>> {
        let mut numbers: Vec<u64> = self
            .article_file_numbers()?
            .into_iter()
            .filter(|n| range.contains(n))
            .collect();
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// `(number, entry)` pairs within `range`, sorted ascending by number.
    pub fn articles(&self, range: RangeInclusive<u64>) -> Result<Vec<(u64, Value)>> {
        let mut out = Vec::new();
        for n in self.article_numbers(range)? {
            if let Some(entry) = self.article(n)? {
                out.push((n, entry));
            }
        }
        Ok(out)
    }

    /// Allocate the next article number. Mutates `self.config.next_article_number`
    /// in memory only — the caller is responsible for eventually persisting the
    /// config (the Poller does this once, at the end of a poll, via its save guard).
    pub fn next_article_number(&mut self) -> Result<u64> {
        let mut candidate = match self.config.next_article_number {
            Some(n) => n,
            None => {
                let (_, highest, _) = self.article_range()?;
                highest + 1
            }
        };
        // Defensive: skip past any pre-existing file with this name.
        while self.dir.join(candidate.to_string()).exists() {
            candidate += 1;
        }
        self.config.next_article_number = Some(candidate + 1);
        Ok(candidate)
    }

    /// `t - lastpolled >= interval` using the group's own interval or `default_interval`.
    pub fn ready_to_check(&self, t: u64, default_interval: u64) -> bool {
        let interval = self.config.interval.unwrap_or(default_interval);
        let lastpolled = self.config.lastpolled.unwrap_or(0);
        t.saturating_sub(lastpolled) >= interval
    }

    /// Atomically persist `config`.
    pub fn save_config(&self) -> Result<()> {
        write_json(&self.dir.join("config"), &self.config)
    }

    /// Atomically persist an article record.
    pub fn save_article(&self, n: u64, entry: &Value) -> Result<()> {
        write_json(&self.dir.join(n.to_string()), entry)
    }

    /// Remove an article record (used by expiry).
    pub fn remove_article(&self, n: u64) -> Result<()> {
        let path = self.dir.join(n.to_string());
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Load the identifier → article number index. Absence is treated as empty.
    pub fn index(&self) -> Result<BTreeMap<String, u64>> {
        let path = self.dir.join("index");
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        Ok(read_json(&path)?)
    }

    /// Atomically persist the index.
    pub fn save_index(&self, index: &BTreeMap<String, u64>) -> Result<()> {
        write_json(&self.dir.join("index"), index)
    }

    /// Modification time of an article record, used by expiry.
    pub fn article_mtime(&self, n: u64) -> Result<Option<SystemTime>> {
        let path = self.dir.join(n.to_string());
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn article_file_numbers(&self) -> Result<Vec<u64>> {
        let mut numbers = Vec::new();
        if !self.dir.exists() {
            return Ok(numbers);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(|c: char| c.is_ascii_digit()) {
                if let Ok(n) = name.parse::<u64>() {
                    numbers.push(n);
                }
            }
        }
        Ok(numbers)
    }
}

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{nanos}", std::process::id())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = dir.join(format!(".tmp-{}-{}", path.file_name().unwrap().to_string_lossy(), unique_suffix()));
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| BridgeError::CorruptRecord {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(href: &str) -> GroupConfig {
        GroupConfig {
            href: href.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        store.create("demo", config("http://example/feed.xml")).unwrap();
        let loaded = store.load("demo").unwrap();
        assert_eq!(loaded.config.href, "http://example/feed.xml");
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        store.create("demo", config("http://example/feed.xml")).unwrap();
        assert!(matches!(
            store.create("demo", config("http://example/feed.xml")),
            Err(BridgeError::GroupAlreadyExists(_))
        ));
    }

    #[test]
    fn create_without_href_fails() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        assert!(matches!(
            store.create("demo", config("")),
            Err(BridgeError::MissingHref)
        ));
    }

    #[test]
    fn load_missing_group_fails() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        assert!(matches!(store.load("ghost"), Err(BridgeError::NoSuchGroup(_))));
    }

    #[test]
    fn next_article_number_is_monotonic_and_skips_collisions() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let mut group = store.create("demo", config("http://example/feed.xml")).unwrap();

        let first = group.next_article_number().unwrap();
        assert_eq!(first, 1);
        group.save_article(first, &Value::String("a".into())).unwrap();

        let second = group.next_article_number().unwrap();
        assert_eq!(second, 2);
    }

    #[test]
    fn article_range_reflects_directory_contents() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let group = store.create("demo", config("http://example/feed.xml")).unwrap();
        group.save_article(1, &Value::String("a".into())).unwrap();
        group.save_article(3, &Value::String("c".into())).unwrap();

        let (lowest, highest, count) = group.article_range().unwrap();
        assert_eq!((lowest, highest, count), (1, 3, 2));
    }

    #[test]
    fn non_numeric_files_are_not_articles() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let group = store.create("demo", config("http://example/feed.xml")).unwrap();
        fs::write(group.dir.join("lock"), b"").unwrap();
        fs::write(group.dir.join("notes.txt"), b"").unwrap();

        let (_, _, count) = group.article_range().unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn index_absence_is_empty() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let group = store.create("demo", config("http://example/feed.xml")).unwrap();
        assert!(group.index().unwrap().is_empty());
    }

    #[test]
    fn ready_to_check_honours_interval() {
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let mut config = config("http://example/feed.xml");
        config.interval = Some(100);
        config.lastpolled = Some(1000);
        let group = store.create("demo", config).unwrap();

        assert!(!group.ready_to_check(1050, 1800));
        assert!(group.ready_to_check(1100, 1800));
    }
}
