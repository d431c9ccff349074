//! Single-group ingest state machine: turns a fetched [`FeedDocument`] into
//! idempotent inserts/updates against a [`Group`].

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::digest::{message_digest, same_entry};
use crate::error::{BridgeError, Result};
use crate::feed::{FeedDocument, FeedSource};
use crate::store::Group;
use crate::time::StructTime;

/// Outcome of ingesting one entry, used by callers (and P4's idempotency test) to
/// observe whether anything actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    New,
    Updated,
    Unchanged,
}

/// Result of a single poll.
#[derive(Debug, Default)]
pub struct PollReport {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
}

const FEED_META_KEYS: &[&str] = &[
    "title",
    "title_detail",
    "link",
    "links",
    "subtitle",
    "subtitle_detail",
    "rights",
    "rights_detail",
    "id",
    "author",
    "author_detail",
];

/// Poll one locked group against `source`, mutating it in place. `config.lastpolled`
/// and the failure counters are always saved before returning, success or failure,
/// matching the scoped-cleanup guarantee in §4.E.
pub async fn poll_group(group: &mut Group, source: &dyn FeedSource, now: u64) -> Result<PollReport> {
    let etag = group.config.etag.clone();
    let modified = group.config.modified.clone();
    let document = source.fetch(&group.config.href, etag.as_deref(), modified.as_deref()).await;

    let result = run_ingest(group, &document, now);

    match &result {
        Ok(_) => {
            group.config.last_failed_poll = None;
            group.config.failed_polls = None;
        }
        Err(_) => {
            group.config.last_failed_poll = Some(now);
            group.config.failed_polls = Some(group.config.failed_polls.unwrap_or(0) + 1);
        }
    }
    group.save_config()?;

    result
}

fn run_ingest(group: &mut Group, document: &FeedDocument, now: u64) -> Result<PollReport> {
    // Step 1: transport outcome.
    if document.bozo {
        if document.status.is_none() {
            let message = document
                .bozo_exception
                .clone()
                .unwrap_or_else(|| "transport failure".to_string());
            warn!(href = %group.config.href, %message, "feed transport failure");
            return Err(BridgeError::TransportFailure {
                href: group.config.href.clone(),
                message,
            });
        }
        warn!(
            href = %group.config.href,
            status = document.status.unwrap(),
            "feed parsed with warnings"
        );
    }

    // Step 2: state refresh. Only reached past the early return above, so a pure
    // transport failure (bozo with no status) leaves `lastpolled` untouched — only
    // the failure counters (applied by the caller) change.
    group.config.lastpolled = Some(now);
    if let Some(etag) = &document.etag {
        group.config.etag = Some(etag.clone());
    }
    if let Some(modified) = &document.modified {
        group.config.modified = Some(modified.clone());
    }
    if let Value::Object(meta) = &document.feed {
        for key in FEED_META_KEYS {
            if let Some(value) = meta.get(*key) {
                group.config.feed_meta.insert((*key).to_string(), value.clone());
            }
        }
    }

    // Step 3: redirect.
    if document.status == Some(301) {
        group.config.href = document.href.clone();
    }

    // Step 304 Not Modified short-circuits with nothing further to ingest.
    if document.status == Some(304) {
        return Ok(PollReport::default());
    }

    // Step 4: fallback publication time.
    let feed_updated = document
        .feed
        .get("updated_parsed")
        .and_then(Value::as_i64)
        .map(timestamp_to_struct_time)
        .unwrap_or_else(StructTime::now);

    // Step 5: entry iteration, reversed to ascending chronological order.
    let mut index = group.index()?;
    let mut report = PollReport::default();

    for entry in document.entries.iter().rev() {
        let mut entry = canonicalize_entry(entry);
        let digest = message_digest(&Value::Object(entry.clone()));
        entry_set_str(&mut entry, "message_id", &digest);

        let existing_number = index.get(&digest).copied();
        let existing_record = match existing_number {
            Some(n) => group.article(n)?,
            None => None,
        };

        match existing_record {
            Some(existing) if same_entry(&existing, &Value::Object(entry.clone())) => {
                report.unchanged += 1;
                continue;
            }
            Some(_) => {
                let number = existing_number.unwrap();
                entry_set_struct_time(&mut entry, "feed_updated_parsed", feed_updated);
                group.save_article(number, &Value::Object(entry.clone()))?;
                report.updated += 1;
                info!(group = %group.name, number, "article updated");
            }
            None => {
                // Either genuinely new, or the index pointed at an expired/missing
                // record: both cases allocate a fresh number (self-healing index).
                let number = group.next_article_number()?;
                entry_set_struct_time(&mut entry, "feed_updated_parsed", feed_updated);
                group.save_article(number, &Value::Object(entry.clone()))?;
                index.insert(digest, number);
                report.new += 1;
                info!(group = %group.name, number, "article ingested");
            }
        }
    }

    // Step 6: persist index.
    group.save_index(&index)?;

    Ok(report)
}

/// Coerce an entry's `type`/`rel` fields to strings (already strings via serde_json;
/// this guards against a future feed-source representation drifting into a different
/// JSON shape, which would otherwise change the digest for bit-identical entries).
fn canonicalize_entry(entry: &Value) -> Map<String, Value> {
    entry.as_object().cloned().unwrap_or_default()
}

fn entry_set_str(entry: &mut Map<String, Value>, key: &str, value: &str) {
    entry.insert(key.to_string(), json!(value));
}

fn entry_set_struct_time(entry: &mut Map<String, Value>, key: &str, value: StructTime) {
    entry.insert(key.to_string(), serde_json::to_value(value).expect("StructTime always serializes"));
}

fn timestamp_to_struct_time(secs: i64) -> StructTime {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(StructTime::from_datetime)
        .unwrap_or_else(StructTime::now)
}

/// Remove articles older than the group's (or the process-wide default) lifetime.
/// Requires the caller to hold the group lock.
pub fn expire_group(group: &mut Group, now: std::time::SystemTime, default_lifetime: Option<u64>) -> Result<usize> {
    let Some(lifetime) = group.config.article_lifetime.or(default_lifetime) else {
        return Ok(0);
    };
    let lifetime = std::time::Duration::from_secs(lifetime);

    let mut index = group.index()?;
    let (lowest, highest, _) = group.article_range()?;
    let mut removed = 0usize;

    for number in lowest..=highest {
        let Some(mtime) = group.article_mtime(number)? else {
            continue;
        };
        let age = now.duration_since(mtime).unwrap_or_default();
        if age > lifetime {
            group.remove_article(number)?;
            index.retain(|_, n| *n != number);
            removed += 1;
        }
    }

    if removed > 0 {
        group.save_index(&index)?;
    }
    Ok(removed)
}
