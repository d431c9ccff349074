//! Process-wide poll orchestration: pick due groups, bound concurrency, touch the
//! scheduler's own lock, aggregate failures.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::feed::FeedSource;
use crate::lock::GroupLock;
use crate::poller::poll_group;
use crate::store::GroupStore;

/// Poll every due group under `settings`, bounded by `settings.feed_poll_concurrency`.
pub async fn run_scheduled_poll(settings: Arc<Settings>, source: Arc<dyn FeedSource>) -> Result<()> {
    let store = GroupStore::new(&settings.groups_dir);
    let mut update_lock = GroupLock::new(store.update_lock_path(), settings.lock_expiry);

    if !update_lock.trylock()? {
        info!("another scheduler run is already in progress, exiting");
        return Ok(());
    }

    let now = now_secs();
    let names = store.list()?;
    let mut due = Vec::new();
    for name in names {
        if let Ok(group) = store.load(&name) {
            if group.ready_to_check(now, settings.feed_poll_interval) {
                due.push(name);
            }
        }
    }

    let semaphore = Arc::new(tokio::sync::Semaphore::new(settings.feed_poll_concurrency));
    let mut handles = Vec::new();

    for name in due {
        if !update_lock.touch()? {
            warn!("scheduler lock snatched, stopping new dispatches");
            break;
        }

        let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        let settings = settings.clone();
        let source = source.clone();
        let name = name.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            poll_one_group(&settings, source.as_ref(), &name).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    update_lock.unlock()?;
    Ok(())
}

/// Force a poll of specific groups regardless of `ready_to_check`, used by
/// `update NAME...`.
pub async fn run_forced_poll(settings: Arc<Settings>, source: Arc<dyn FeedSource>, names: Vec<String>) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(settings.feed_poll_concurrency));
    let mut handles = Vec::new();

    for name in names {
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        let settings = settings.clone();
        let source = source.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            poll_one_group(&settings, source.as_ref(), &name).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn poll_one_group(settings: &Settings, source: &dyn FeedSource, name: &str) {
    let store = GroupStore::new(&settings.groups_dir);
    let mut group = match store.load(name) {
        Ok(g) => g,
        Err(err) => {
            warn!(group = name, %err, "failed to load group for poll");
            return;
        }
    };

    let mut lock = GroupLock::new(group.lock_path(), settings.lock_expiry);
    match lock.trylock() {
        Ok(true) => {}
        Ok(false) => {
            info!(group = name, "group already locked, skipping");
            return;
        }
        Err(err) => {
            warn!(group = name, %err, "failed to acquire group lock");
            return;
        }
    }

    let deadline = tokio::time::timeout(settings.socket_timeout, poll_group(&mut group, source, now_secs())).await;
    match deadline {
        Ok(Ok(report)) => {
            info!(group = name, new = report.new, updated = report.updated, "poll complete");
        }
        Ok(Err(err)) => {
            warn!(group = name, %err, "poll failed");
        }
        Err(_) => {
            warn!(group = name, "poll timed out");
        }
    }

    if let Err(err) = lock.unlock() {
        warn!(group = name, %err, "failed to release group lock");
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::StubFeedSource;
    use crate::store::GroupConfig;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn forced_poll_ingests_named_group() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(Settings::with_base_dir(dir.path()));
        let store = GroupStore::new(&settings.groups_dir);
        store
            .create(
                "demo",
                GroupConfig {
                    href: "http://example/feed.xml".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        let document = crate::feed::FeedDocument {
            bozo: false,
            href: "http://example/feed.xml".to_string(),
            feed: json!({}),
            entries: vec![json!({"id": "e1", "title_detail": {"value": "One", "type": "text/plain"}})],
            ..Default::default()
        };
        let source: Arc<dyn FeedSource> = Arc::new(StubFeedSource::new(document));

        run_forced_poll(settings.clone(), source, vec!["demo".to_string()]).await;

        let group = store.load("demo").unwrap();
        let (_, _, count) = group.article_range().unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn scheduled_poll_skips_groups_not_yet_due() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(Settings::with_base_dir(dir.path()));
        let store = GroupStore::new(&settings.groups_dir);
        store
            .create(
                "demo",
                GroupConfig {
                    href: "http://example/feed.xml".to_string(),
                    interval: Some(999_999),
                    lastpolled: Some(now_secs()),
                    ..Default::default()
                },
            )
            .unwrap();

        let source: Arc<dyn FeedSource> = Arc::new(StubFeedSource::new(Default::default()));
        run_scheduled_poll(settings, source).await.unwrap();

        let group = store.load("demo").unwrap();
        let (_, _, count) = group.article_range().unwrap();
        assert_eq!(count, 0);
    }
}
