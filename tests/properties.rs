//! Property and stress tests for the invariants enumerated in SPEC_FULL.md's
//! "testable properties" section that span more than one module.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use pnntprss::digest::{canonical_form, message_digest};
use pnntprss::feed::{FeedDocument, StubFeedSource};
use pnntprss::poller::poll_group;
use pnntprss::{GroupConfig, GroupLock, GroupStore};
use proptest::prelude::*;
use serde_json::json;
use tempfile::tempdir;

fn entry(id: &str) -> serde_json::Value {
    json!({"id": id, "title_detail": {"value": format!("Title {id}"), "type": "text/plain"}})
}

proptest! {
    // P1: next_article_number always exceeds every extant article number, across any
    // sequence of ingest batches.
    #[test]
    fn next_article_number_always_exceeds_existing_articles(
        batches in prop::collection::vec(prop::collection::vec("[a-z]{1,6}", 0..4), 1..6)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let mut group = store
            .create(
                "demo",
                GroupConfig {
                    href: "http://example.test/feed.xml".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        for (i, ids) in batches.iter().enumerate() {
            let entries: Vec<_> = ids.iter().map(|id| entry(id)).collect();
            let document = FeedDocument {
                bozo: false,
                status: Some(200),
                href: "http://example.test/feed.xml".to_string(),
                feed: json!({}),
                entries,
                ..Default::default()
            };
            let source = StubFeedSource::new(document);
            runtime.block_on(poll_group(&mut group, &source, 1_000 + i as u64)).unwrap();

            let (_, highest, count) = group.article_range().unwrap();
            if count > 0 {
                let next = group.config.next_article_number.unwrap_or(1);
                prop_assert!(next > highest);
            }
        }
    }

    // P2: equal canonical form implies equal digest; entries with different canonical
    // form overwhelmingly do not collide.
    #[test]
    fn digest_matches_canonical_form_equality(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
        let entry_a = entry(&a);
        let entry_b = entry(&b);
        if canonical_form(&entry_a) == canonical_form(&entry_b) {
            prop_assert_eq!(message_digest(&entry_a), message_digest(&entry_b));
        } else {
            prop_assert_ne!(message_digest(&entry_a), message_digest(&entry_b));
        }
    }
}

#[test]
fn p5_concurrent_config_writes_never_expose_a_half_written_record() {
    let dir = tempdir().unwrap();
    let store = GroupStore::new(dir.path());
    store
        .create(
            "demo",
            GroupConfig {
                href: "http://example.test/feed.xml".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    let start = Arc::new(Barrier::new(2));

    let writer = {
        let dir_path = dir.path().to_path_buf();
        let start = start.clone();
        std::thread::spawn(move || {
            let store = GroupStore::new(&dir_path);
            start.wait();
            for n in 0..200u64 {
                let mut g = store.load("demo").unwrap();
                g.config.interval = Some(n);
                g.save_config().unwrap();
            }
        })
    };

    let reader = {
        let dir_path = dir.path().to_path_buf();
        let start = start.clone();
        std::thread::spawn(move || {
            start.wait();
            let store = GroupStore::new(&dir_path);
            for _ in 0..200 {
                // Loading deserialises the config; any half-written temp+rename would
                // surface as a JSON parse error here instead of silently succeeding.
                store.load("demo").unwrap();
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn p6_concurrent_lock_attempts_succeed_at_most_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lock");
    let start = Arc::new(Barrier::new(2));

    let attempt = |path: std::path::PathBuf, start: Arc<Barrier>| {
        std::thread::spawn(move || {
            let mut lock = GroupLock::new(&path, Duration::from_secs(1800));
            start.wait();
            lock.trylock().unwrap()
        })
    };

    let a = attempt(path.clone(), start.clone());
    let b = attempt(path.clone(), start.clone());

    let a_won = a.join().unwrap();
    let b_won = b.join().unwrap();

    eprintln!("DEBUGLOG: {:#?}", pnntprss::lock::DEBUG_LOG.lock().unwrap());
    assert_ne!(a_won, b_won, "exactly one concurrent trylock should succeed");
}
