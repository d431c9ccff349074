//! Entry → RFC 5322/MIME message rendering: headers, body coercion, encoding
//! selection, and the wire-level framing (dot-stuffing, line-ending normalisation)
//! the NNTP session applies when serving ARTICLE/BODY.

use serde_json::Value;

use crate::store::GroupConfig;
use crate::time::StructTime;

/// A fully rendered message, ready for the NNTP session to frame onto the wire.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    /// Header name/value pairs, in the order they must appear on the wire.
    pub headers: Vec<(&'static str, String)>,
    /// Final body text, not yet dot-stuffed or CRLF-normalised.
    pub body: String,
}

/// Build the message for one stored article.
pub fn render(group_name: &str, message_id: &str, entry: &Value, group_config: &GroupConfig) -> RenderedMessage {
    let from = from_header(entry, group_config);
    let date = date_header(entry);
    let subject = subject_header(entry);

    let (body, content_type_base) = body_and_type(entry);
    let (body, content_type, cte) = encode_body(body, content_type_base);

    let mut headers = vec![
        ("From", from),
        ("Newsgroups", group_name.to_string()),
        ("Date", date),
        ("Subject", subject),
        ("Message-ID", format!("<{message_id}@{group_name}>")),
        ("Path", "pnntprss".to_string()),
        ("MIME-Version", "1.0".to_string()),
        ("Content-Type", content_type),
    ];
    if let Some(cte) = cte {
        headers.push(("Content-Transfer-Encoding", cte));
    }

    RenderedMessage { headers, body }
}

fn detail_value(detail: Option<&Value>) -> Option<(String, String)> {
    let detail = detail?;
    let value = detail.get("value")?.as_str()?.to_string();
    let mime_type = detail
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("text/plain")
        .to_string();
    Some((value, mime_type))
}

fn from_header(entry: &Value, group_config: &GroupConfig) -> String {
    if let Some((name, email)) = author_detail_pair(entry.get("author_detail")) {
        return encode_header_words(&combine_name_email(&name, &email));
    }
    if let Some(author) = entry.get("author").and_then(Value::as_str) {
        return encode_header_words(&combine_name_email(author, ""));
    }
    if let Some((name, email)) = author_detail_pair(group_config.feed_meta.get("author_detail")) {
        return encode_header_words(&combine_name_email(&name, &email));
    }
    if let Some(author) = group_config.feed_meta.get("author").and_then(Value::as_str) {
        return encode_header_words(&combine_name_email(author, ""));
    }
    if let Some(title) = group_config.feed_meta.get("title").and_then(Value::as_str) {
        return encode_header_words(&combine_name_email(title, ""));
    }
    "Unknown <unknown@unknown>".to_string()
}

fn author_detail_pair(detail: Option<&Value>) -> Option<(String, String)> {
    let detail = detail?;
    let name = detail.get("name").and_then(Value::as_str).unwrap_or("").to_string();
    let email = detail.get("email").and_then(Value::as_str).unwrap_or("").to_string();
    if name.is_empty() && email.is_empty() {
        None
    } else {
        Some((name, email))
    }
}

fn combine_name_email(name: &str, email: &str) -> String {
    match (name.is_empty(), email.is_empty()) {
        (false, false) => format!("{name} <{email}>"),
        (false, true) => format!("{name} <unknown@unknown>"),
        (true, false) => email.to_string(),
        (true, true) => String::new(),
    }
}

pub(crate) fn date_header(entry: &Value) -> String {
    if let Some(secs) = entry.get("updated_parsed").and_then(Value::as_i64) {
        return timestamp_to_rfc5322(secs);
    }
    if let Some(tuple) = entry.get("feed_updated_parsed") {
        if let Ok(st) = serde_json::from_value::<StructTime>(tuple.clone()) {
            return st.to_rfc5322();
        }
    }
    StructTime::now().to_rfc5322()
}

fn timestamp_to_rfc5322(secs: i64) -> String {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(StructTime::from_datetime)
        .unwrap_or_else(StructTime::now)
        .to_rfc5322()
}

fn subject_header(entry: &Value) -> String {
    entry
        .get("title_detail")
        .and_then(|d| d.get("value"))
        .and_then(Value::as_str)
        .map(|s| encode_header_words(s))
        .unwrap_or_default()
}

/// Select the body/content-type pair per §4.C's body-selection and rendering rules.
fn body_and_type(entry: &Value) -> (String, String) {
    let selected = entry
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| detail_value(Some(item)))
        .or_else(|| detail_value(entry.get("summary_detail")))
        .unwrap_or_else(|| (String::new(), "text/plain".to_string()));

    let (value, mime_type) = selected;
    let link = entry.get("link").and_then(Value::as_str);

    if link.is_none() && mime_type == "text/plain" {
        return (value, "text/plain".to_string());
    }

    let caption = entry
        .get("title_detail")
        .and_then(|d| d.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| link.map(str::to_string))
        .unwrap_or_default();

    let body = match link {
        Some(link) => format!("<h1><a href='{link}'>{caption}</a></h1>\n{value}"),
        None => value,
    };
    (body, "text/html".to_string())
}

/// Choose the body's final transfer encoding: 8-bit for pure ASCII, otherwise the
/// shorter of quoted-printable or base64.
fn encode_body(body: String, content_type: String) -> (String, String, Option<String>) {
    if body.is_ascii() {
        return (body, content_type, None);
    }

    let content_type = format!("{content_type}; charset=utf-8");
    let qp = encode_quoted_printable(body.as_bytes());
    let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, body.as_bytes());

    if qp.len() <= b64.len() {
        (qp, content_type, Some("quoted-printable".to_string()))
    } else {
        (b64, content_type, Some("base64".to_string()))
    }
}

/// Minimal RFC 2045 quoted-printable encoder with 76-column soft line breaks.
fn encode_quoted_printable(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut line_len = 0usize;
    for &byte in bytes {
        let encoded: Vec<u8> = if byte == b'\n' {
            out.push('\n');
            line_len = 0;
            continue;
        } else if byte == b'\r' {
            continue;
        } else if byte == b'=' || byte < 0x20 || byte >= 0x7f {
            format!("={byte:02X}").into_bytes()
        } else {
            vec![byte]
        };

        if line_len + encoded.len() > 75 {
            out.push_str("=\r\n");
            line_len = 0;
        }
        out.push_str(std::str::from_utf8(&encoded).unwrap());
        line_len += encoded.len();
    }
    out
}

/// RFC 2047-encode whitespace-separated words that contain non-ASCII bytes,
/// choosing the shorter of Q- and B-encoding per word. ASCII words pass through.
fn encode_header_words(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            if word.is_ascii() {
                word.to_string()
            } else {
                encode_word(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn encode_word(word: &str) -> String {
    let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, word.as_bytes());
    let b_encoded = format!("=?utf-8?B?{b64}?=");

    let mut q_body = String::new();
    for byte in word.bytes() {
        if byte == b' ' {
            q_body.push('_');
        } else if byte.is_ascii_alphanumeric() || matches!(byte, b'!' | b'*' | b'+' | b'-' | b'/') {
            q_body.push(byte as char);
        } else {
            q_body.push_str(&format!("={byte:02X}"));
        }
    }
    let q_encoded = format!("=?utf-8?Q?{q_body}?=");

    if q_encoded.len() <= b_encoded.len() {
        q_encoded
    } else {
        b_encoded
    }
}

/// Wire-level body post-processing applied when serving ARTICLE/BODY: normalise
/// line endings to CRLF, dot-stuff, and terminate with a lone `.` line.
pub fn wire_encode_body(body: &str) -> String {
    let normalized = normalize_line_endings(body);
    let trimmed = normalized.strip_suffix("\r\n").unwrap_or(&normalized);
    let mut out = String::with_capacity(normalized.len() + 8);
    for line in trimmed.split("\r\n") {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}

fn normalize_line_endings(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("\r\n");
            }
            '\n' if chars.peek() == Some(&'\r') => {
                chars.next();
                out.push_str("\r\n");
            }
            '\r' | '\n' => out.push_str("\r\n"),
            c => out.push(c),
        }
    }
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}
