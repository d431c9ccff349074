//! Read-only NNTP session state machine and TCP server.

use std::ops::RangeInclusive;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::message;
use crate::store::GroupStore;

/// NNTP response status codes this session emits (RFC 3977).
pub mod codes {
    pub const READY_NO_POSTING: u16 = 201;
    pub const GROUP_SELECTED: u16 = 211;
    pub const LIST_FOLLOWS: u16 = 215;
    pub const ARTICLE_FOLLOWS: u16 = 220;
    pub const HEAD_FOLLOWS: u16 = 221;
    pub const BODY_FOLLOWS: u16 = 222;
    pub const ARTICLE_STAT: u16 = 223;
    pub const OVERVIEW_FOLLOWS: u16 = 224;
    pub const CLOSING_CONNECTION: u16 = 205;
    pub const NO_SUCH_GROUP: u16 = 411;
    pub const NO_GROUP_SELECTED: u16 = 412;
    pub const NO_CURRENT_ARTICLE: u16 = 420;
    pub const NO_SUCH_ARTICLE_NUMBER: u16 = 423;
    pub const COMMAND_NOT_RECOGNIZED: u16 = 500;
    pub const COMMAND_SYNTAX_ERROR: u16 = 501;
}

/// Run the NNTP server, accepting connections until the process is terminated.
pub async fn serve(settings: Arc<Settings>) -> std::io::Result<()> {
    let listener = TcpListener::bind(settings.nntp_addr).await?;
    info!(addr = %settings.nntp_addr, "nntp server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let settings = settings.clone();
        tokio::spawn(async move {
            debug!(%peer, "connection accepted");
            if let Err(err) = handle_connection(stream, settings).await {
                debug!(%peer, %err, "connection closed with error");
            } else {
                debug!(%peer, "connection closed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, settings: Arc<Settings>) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut session = NntpSession::new(settings);
    write_half.write_all(session.greeting().as_bytes()).await?;

    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let response = session.handle_line(trimmed);
        write_half.write_all(response.as_bytes()).await?;
        if session.finished {
            break;
        }
    }
    Ok(())
}

/// Per-connection protocol state.
struct NntpSession {
    settings: Arc<Settings>,
    store: GroupStore,
    finished: bool,
    current_group: Option<String>,
    current_article_number: Option<u64>,
}

impl NntpSession {
    fn new(settings: Arc<Settings>) -> Self {
        let store = GroupStore::new(&settings.groups_dir);
        Self {
            settings,
            store,
            finished: false,
            current_group: None,
            current_article_number: None,
        }
    }

    fn greeting(&self) -> String {
        response_line(codes::READY_NO_POSTING, "server ready - no posting allowed")
    }

    fn handle_line(&mut self, line: &str) -> String {
        let mut tokens = line.split_whitespace();
        let Some(verb) = tokens.next() else {
            return response_line(codes::COMMAND_SYNTAX_ERROR, "command syntax error");
        };
        let args: Vec<&str> = tokens.collect();

        match verb.to_ascii_uppercase().as_str() {
            "MODE" if args.len() == 1 && args[0].eq_ignore_ascii_case("READER") => {
                response_line(codes::READY_NO_POSTING, "Hello, you can't post")
            }
            "QUIT" if args.is_empty() => {
                self.finished = true;
                response_line(codes::CLOSING_CONNECTION, "closing connection - goodbye!")
            }
            "LIST" if args.is_empty() => self.handle_list(),
            "GROUP" if args.len() == 1 => self.handle_group(args[0]),
            "XOVER" => self.handle_xover(args.first().copied()),
            "ARTICLE" => self.handle_retrieve(args.first().copied(), Retrieve::Article),
            "HEAD" => self.handle_retrieve(args.first().copied(), Retrieve::Head),
            "BODY" => self.handle_retrieve(args.first().copied(), Retrieve::Body),
            "STAT" => self.handle_retrieve(args.first().copied(), Retrieve::Stat),
            _ => response_line(codes::COMMAND_NOT_RECOGNIZED, "command not recognized"),
        }
    }

    fn handle_list(&self) -> String {
        let mut out = response_line(codes::LIST_FOLLOWS, "list of newsgroups follows");
        let names = self.store.list().unwrap_or_default();
        for name in names {
            if let Ok(group) = self.store.load(&name) {
                if let Ok((lowest, highest, _)) = group.article_range() {
                    out.push_str(&format!("{name} {highest} {lowest} n\r\n"));
                }
            }
        }
        out.push_str(".\r\n");
        out
    }

    fn handle_group(&mut self, name: &str) -> String {
        let group = match self.store.load(name) {
            Ok(g) => g,
            Err(_) => return response_line(codes::NO_SUCH_GROUP, "no such news group"),
        };
        let (lowest, highest, count) = match group.article_range() {
            Ok(r) => r,
            Err(_) => return response_line(codes::NO_SUCH_GROUP, "no such news group"),
        };

        self.current_group = Some(name.to_string());
        self.current_article_number = if count > 0 { Some(lowest) } else { None };

        response_line(
            codes::GROUP_SELECTED,
            &format!("{count} {lowest} {highest} {name} group selected"),
        )
    }

    fn handle_xover(&self, range_arg: Option<&str>) -> String {
        let Some(group_name) = &self.current_group else {
            return response_line(codes::NO_GROUP_SELECTED, "no newsgroup selected");
        };
        let Ok(group) = self.store.load(group_name) else {
            return response_line(codes::NO_GROUP_SELECTED, "no newsgroup selected");
        };

        let range = match range_arg {
            Some(spec) => match parse_range(spec) {
                Some(r) => r,
                None => return response_line(codes::COMMAND_SYNTAX_ERROR, "command syntax error"),
            },
            None => match self.current_article_number {
                Some(n) => n..=u64::MAX,
                None => return response_line(codes::NO_CURRENT_ARTICLE, "no current article"),
            },
        };

        let articles = group.articles(range).unwrap_or_default();
        if articles.is_empty() {
            return response_line(codes::NO_CURRENT_ARTICLE, "no articles in range");
        }

        let mut out = response_line(codes::OVERVIEW_FOLLOWS, "overview information follows");
        for (number, entry) in articles {
            out.push_str(&overview_line(number, &entry, group_name));
            out.push_str("\r\n");
        }
        out.push_str(".\r\n");
        out
    }

    fn handle_retrieve(&mut self, arg: Option<&str>, kind: Retrieve) -> String {
        let Some(group_name) = self.current_group.clone() else {
            return response_line(codes::NO_GROUP_SELECTED, "no newsgroup selected");
        };
        let Ok(group) = self.store.load(&group_name) else {
            return response_line(codes::NO_GROUP_SELECTED, "no newsgroup selected");
        };

        let number = match arg {
            Some(spec) => match spec.parse::<u64>() {
                Ok(n) => n,
                Err(_) => return response_line(codes::COMMAND_SYNTAX_ERROR, "command syntax error"),
            },
            None => match self.current_article_number {
                Some(n) => n,
                None => return response_line(codes::NO_CURRENT_ARTICLE, "no current article"),
            },
        };

        if arg.is_some() {
            self.current_article_number = Some(number);
        }

        let Ok(Some(entry)) = group.article(number) else {
            return response_line(codes::NO_SUCH_ARTICLE_NUMBER, "no such article number in this group");
        };

        let message_id = entry
            .get("message_id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_string();
        let rendered = message::render(&group_name, &message_id, &entry, &group.config);
        let full_id = format!("<{message_id}@{group_name}>");

        let header_block: String = rendered
            .headers
            .iter()
            .map(|(k, v)| format!("{k}: {v}\r\n"))
            .collect();

        match kind {
            Retrieve::Article => {
                let mut out = response_line(
                    codes::ARTICLE_FOLLOWS,
                    &format!("{number} {full_id} article retrieved - head and body follow"),
                );
                out.push_str(&header_block);
                out.push_str("\r\n");
                out.push_str(&message::wire_encode_body(&rendered.body));
                out
            }
            Retrieve::Head => {
                let mut out = response_line(
                    codes::HEAD_FOLLOWS,
                    &format!("{number} {full_id} article retrieved - head follows"),
                );
                out.push_str(&header_block);
                out.push_str(".\r\n");
                out
            }
            Retrieve::Body => {
                let mut out = response_line(
                    codes::BODY_FOLLOWS,
                    &format!("{number} {full_id} article retrieved - body follows"),
                );
                out.push_str(&message::wire_encode_body(&rendered.body));
                out
            }
            Retrieve::Stat => response_line(
                codes::ARTICLE_STAT,
                &format!("{number} {full_id} article retrieved - request text separately"),
            ),
        }
    }
}

enum Retrieve {
    Article,
    Head,
    Body,
    Stat,
}

fn response_line(code: u16, rest: &str) -> String {
    format!("{code} {rest}\r\n")
}

/// Overview fields, tab-separated: number, subject, from, date, message-id,
/// references (empty), bytes (empty), lines (empty). Tabs within a field become spaces.
fn overview_line(number: u64, entry: &serde_json::Value, group_name: &str) -> String {
    let subject = entry
        .get("title_detail")
        .and_then(|d| d.get("value"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");
    let from = entry.get("author").and_then(serde_json::Value::as_str).unwrap_or("");
    let message_id = entry.get("message_id").and_then(serde_json::Value::as_str).unwrap_or("");
    let date = message::date_header(entry);

    let fields = [
        number.to_string(),
        subject.to_string(),
        from.to_string(),
        date,
        format!("<{message_id}@{group_name}>"),
        String::new(),
        String::new(),
        String::new(),
    ];
    fields
        .iter()
        .map(|f| f.replace('\t', " "))
        .collect::<Vec<_>>()
        .join("\t")
}

/// `N` -> single; `N-` -> `[N, inf)`; `N-M` -> `[N, M]`; anything else is malformed.
fn parse_range(spec: &str) -> Option<RangeInclusive<u64>> {
    if let Some((low, high)) = spec.split_once('-') {
        let low: u64 = low.parse().ok()?;
        if high.is_empty() {
            Some(low..=u64::MAX)
        } else {
            let high: u64 = high.parse().ok()?;
            Some(low..=high)
        }
    } else {
        let n: u64 = spec.parse().ok()?;
        Some(n..=n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GroupConfig;
    use serde_json::json;
    use tempfile::tempdir;

    fn settings_for(dir: &tempfile::TempDir) -> Arc<Settings> {
        Arc::new(Settings::with_base_dir(dir.path()))
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range("5"), Some(5..=5));
        assert_eq!(parse_range("5-"), Some(5..=u64::MAX));
        assert_eq!(parse_range("5-9"), Some(5..=9));
        assert_eq!(parse_range("abc"), None);
        assert_eq!(parse_range("5-abc"), None);
    }

    #[test]
    fn mode_reader_and_quit() {
        let dir = tempdir().unwrap();
        let mut session = NntpSession::new(settings_for(&dir));
        assert_eq!(
            session.handle_line("MODE READER"),
            "201 Hello, you can't post\r\n"
        );
        assert_eq!(
            session.handle_line("QUIT"),
            "205 closing connection - goodbye!\r\n"
        );
        assert!(session.finished);
    }

    #[test]
    fn unknown_command_is_rejected() {
        let dir = tempdir().unwrap();
        let mut session = NntpSession::new(settings_for(&dir));
        assert_eq!(
            session.handle_line("BOGUS"),
            "500 command not recognized\r\n"
        );
    }

    #[test]
    fn group_not_found_returns_411() {
        let dir = tempdir().unwrap();
        let mut session = NntpSession::new(settings_for(&dir));
        assert_eq!(session.handle_line("GROUP ghost"), "411 no such news group\r\n");
    }

    #[test]
    fn full_session_transcript_matches_scenario_six() {
        let dir = tempdir().unwrap();
        let settings = settings_for(&dir);
        let store = GroupStore::new(&settings.groups_dir);
        let group = store
            .create(
                "demo",
                GroupConfig {
                    href: "http://example/feed.xml".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        for n in 1..=3u64 {
            group
                .save_article(
                    n,
                    &json!({
                        "message_id": format!("digest{n}"),
                        "title_detail": {"value": format!("Title {n}"), "type": "text/plain"},
                        "author": "Alice",
                        "content": [{"value": format!("Body {n}"), "type": "text/plain"}],
                    }),
                )
                .unwrap();
        }

        let mut session = NntpSession::new(settings);
        assert_eq!(session.handle_line("MODE READER"), "201 Hello, you can't post\r\n");
        assert_eq!(
            session.handle_line("GROUP demo"),
            "211 3 1 3 demo group selected\r\n"
        );

        let xover = session.handle_line("XOVER 1-3");
        assert!(xover.starts_with("224 "));
        assert!(xover.ends_with(".\r\n"));
        assert_eq!(xover.lines().count(), 5); // status + 3 overview + terminator
        assert!(xover.contains("<digest1@demo>"));
        assert!(xover.contains("<digest2@demo>"));
        assert!(xover.contains("<digest3@demo>"));

        let article = session.handle_line("ARTICLE 2");
        assert!(article.starts_with("220 2 <digest2@demo>"));
        assert!(article.contains("Message-ID: <digest2@demo>\r\n"));
        assert!(article.contains("Body 2"));
        assert!(article.ends_with(".\r\n"));

        assert_eq!(
            session.handle_line("QUIT"),
            "205 closing connection - goodbye!\r\n"
        );
    }

    #[test]
    fn cursor_updates_even_when_article_missing() {
        let dir = tempdir().unwrap();
        let settings = settings_for(&dir);
        let store = GroupStore::new(&settings.groups_dir);
        let group = store
            .create(
                "demo",
                GroupConfig {
                    href: "http://example/feed.xml".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        for n in 1..=3u64 {
            group
                .save_article(
                    n,
                    &json!({
                        "message_id": format!("digest{n}"),
                        "title_detail": {"value": format!("Title {n}"), "type": "text/plain"},
                        "author": "Alice",
                        "content": [{"value": format!("Body {n}"), "type": "text/plain"}],
                    }),
                )
                .unwrap();
        }

        let mut session = NntpSession::new(settings);
        session.handle_line("MODE READER");
        session.handle_line("GROUP demo");
        session.handle_line("ARTICLE 2");

        let missing = session.handle_line("ARTICLE 999");
        assert!(missing.starts_with("423 "));

        let bare = session.handle_line("BODY");
        assert!(bare.starts_with("423 "));
    }
}
