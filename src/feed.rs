//! Feed fetching and parsing, normalised behind a [`FeedSource`] trait so the
//! Poller never depends on `feed_rs` or `reqwest` types directly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, LOCATION};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::warn;

/// The document a poll produces, matching the feed-parser interface the Poller consumes.
#[derive(Debug, Clone, Default)]
pub struct FeedDocument {
    pub bozo: bool,
    pub bozo_exception: Option<String>,
    pub status: Option<u16>,
    pub href: String,
    pub etag: Option<String>,
    pub modified: Option<String>,
    pub feed: Value,
    pub entries: Vec<Value>,
}

/// Abstraction over "go get this feed", so the Poller can be tested without the network.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, href: &str, etag: Option<&str>, modified: Option<&str>) -> FeedDocument;
}

/// Production `FeedSource`: HTTP fetch via `reqwest`, RSS/Atom parse via `feed-rs`.
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(user_agent: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, href: &str, etag: Option<&str>, modified: Option<&str>) -> FeedDocument {
        let mut url = href.to_string();

        // Follow one redirect hop manually so a permanent redirect can be reported
        // back to the Poller instead of being swallowed by the HTTP client.
        let response = loop {
            let mut request = self.client.get(&url);
            if let Some(etag) = etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(modified) = modified {
                request = request.header(IF_MODIFIED_SINCE, modified);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(err) => {
                    return FeedDocument {
                        bozo: true,
                        bozo_exception: Some(err.to_string()),
                        status: None,
                        href: url,
                        ..Default::default()
                    };
                }
            };

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string);
                match location {
                    Some(location) => {
                        if response.status() == StatusCode::MOVED_PERMANENTLY {
                            return FeedDocument {
                                bozo: false,
                                status: Some(301),
                                href: location,
                                ..Default::default()
                            };
                        }
                        url = location;
                        continue;
                    }
                    None => {
                        return FeedDocument {
                            bozo: true,
                            bozo_exception: Some("redirect without Location header".to_string()),
                            status: Some(response.status().as_u16()),
                            href: url,
                            ..Default::default()
                        };
                    }
                }
            }

            break response;
        };

        let status = response.status();
        let href = response.url().to_string();

        if status == StatusCode::NOT_MODIFIED {
            return FeedDocument {
                bozo: false,
                status: Some(304),
                href,
                etag: etag.map(str::to_string),
                modified: modified.map(str::to_string),
                ..Default::default()
            };
        }

        if !status.is_success() {
            return FeedDocument {
                bozo: true,
                bozo_exception: Some(format!("http status {status}")),
                status: Some(status.as_u16()),
                href,
                ..Default::default()
            };
        }

        let new_etag = response
            .headers()
            .get(ETAG)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let new_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(err) => {
                return FeedDocument {
                    bozo: true,
                    bozo_exception: Some(err.to_string()),
                    status: None,
                    href,
                    ..Default::default()
                };
            }
        };

        match feed_rs::parser::parse(&bytes[..]) {
            Ok(feed) => normalize_feed(feed, status.as_u16(), href, new_etag, new_modified),
            Err(err) => {
                warn!(%err, "feed parsed with errors");
                FeedDocument {
                    bozo: true,
                    bozo_exception: Some(err.to_string()),
                    status: Some(status.as_u16()),
                    href,
                    etag: new_etag,
                    modified: new_modified,
                    ..Default::default()
                }
            }
        }
    }
}

fn normalize_feed(
    feed: feed_rs::model::Feed,
    status: u16,
    href: String,
    etag: Option<String>,
    modified: Option<String>,
) -> FeedDocument {
    let feed_meta = json!({
        "title": feed.title.as_ref().map(|t| t.content.clone()),
        "title_detail": feed.title.as_ref().map(text_detail),
        "link": feed.links.first().map(|l| l.href.clone()),
        "links": feed.links.iter().map(|l| l.href.clone()).collect::<Vec<_>>(),
        "subtitle": feed.description.as_ref().map(|t| t.content.clone()),
        "subtitle_detail": feed.description.as_ref().map(text_detail),
        "rights": feed.rights.as_ref().map(|t| t.content.clone()),
        "rights_detail": feed.rights.as_ref().map(text_detail),
        "id": feed.id,
        "author": feed.authors.first().map(|p| p.name.clone()),
        "author_detail": feed.authors.first().map(author_detail),
        "updated_parsed": feed.updated.map(|dt| dt.timestamp()),
    });

    let entries = feed.entries.iter().map(normalize_entry).collect();

    FeedDocument {
        bozo: false,
        bozo_exception: None,
        status: Some(status),
        href,
        etag,
        modified,
        feed: feed_meta,
        entries,
    }
}

fn normalize_entry(entry: &feed_rs::model::Entry) -> Value {
    let link = entry.links.first().map(|l| l.href.clone());
    let content = entry.content.as_ref().and_then(|c| c.body.clone()).map(|body| {
        json!({ "value": body, "type": entry.content.as_ref()
            .map(|c| c.content_type.as_ref().to_string())
            .unwrap_or_else(|| "text/html".to_string()) })
    });
    let summary_detail = entry.summary.as_ref().map(text_detail);

    json!({
        "id": entry.id,
        "title_detail": entry.title.as_ref().map(text_detail),
        "link": link,
        "content": content.map(|c| vec![c]),
        "summary_detail": summary_detail,
        "author": entry.authors.first().map(|p| p.name.clone()),
        "author_detail": entry.authors.first().map(author_detail),
        "updated_parsed": entry.updated.map(|dt| dt.timestamp()),
        "published_parsed": entry.published.map(|dt| dt.timestamp()),
    })
}

fn text_detail(text: &feed_rs::model::Text) -> Value {
    json!({ "value": text.content, "type": text.content_type.to_string() })
}

fn author_detail(person: &feed_rs::model::Person) -> Value {
    json!({ "name": person.name, "email": person.email })
}

/// Test-only `FeedSource` that returns a pre-built document, used by the Poller's
/// unit tests and the end-to-end scenario tests.
#[cfg(any(test, feature = "test-support"))]
pub struct StubFeedSource {
    pub document: std::sync::Mutex<FeedDocument>,
}

#[cfg(any(test, feature = "test-support"))]
impl StubFeedSource {
    pub fn new(document: FeedDocument) -> Self {
        Self {
            document: std::sync::Mutex::new(document),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl FeedSource for StubFeedSource {
    async fn fetch(&self, _href: &str, _etag: Option<&str>, _modified: Option<&str>) -> FeedDocument {
        self.document.lock().unwrap().clone()
    }
}
