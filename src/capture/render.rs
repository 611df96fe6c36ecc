//! Turning a received request into the text reported to the
//! [`RequestObserver`][crate::event::RequestObserver].

use crate::event::HttpCaptureEvent;
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, Uri};
use time::OffsetDateTime;

pub(super) fn capture_event(scheme: &str, parts: &Parts, body: &[u8]) -> HttpCaptureEvent {
    let url = absolute_url(scheme, &parts.uri, &parts.headers, false);
    let uri = format!("{} {url} {:?}", parts.method, parts.version);
    let replay_url = absolute_url(scheme, &parts.uri, &parts.headers, true);
    HttpCaptureEvent {
        content: raw_text(&uri, &parts.headers, body),
        curl_command: curl_command(parts.method.as_str(), &replay_url, &parts.headers, body),
        url,
        uri,
        received: OffsetDateTime::now_utc(),
    }
}

/// A request target that already names scheme and host (proxy-style) is kept as it is.
/// Otherwise the URL is `scheme://host/path`, with the query only kept when `with_query` is
/// set.
fn absolute_url(scheme: &str, uri: &Uri, headers: &HeaderMap, with_query: bool) -> String {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.to_string();
    }
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();
    let path = match uri.path_and_query() {
        Some(pq) if with_query => pq.as_str(),
        _ => uri.path(),
    };
    format!("{scheme}://{host}{path}")
}

/// The request line, one `Name: Value` line per header value, then a blank line and the body
/// when there is one.
fn raw_text(request_line: &str, headers: &HeaderMap, body: &[u8]) -> String {
    let mut text = format!("{request_line}\r\n");
    for (name, value) in headers {
        text.push_str(&format!(
            "{}: {}\r\n",
            canonical_name(name),
            String::from_utf8_lossy(value.as_bytes())
        ));
    }
    if !body.is_empty() {
        text.push_str("\r\n");
        text.push_str(&String::from_utf8_lossy(&normalize_line_endings(body)));
    }
    text
}

fn curl_command(method: &str, url: &str, headers: &HeaderMap, body: &[u8]) -> String {
    let mut args = vec!["curl".to_string(), "-X".to_string(), shell_quote(method)];
    if !body.is_empty() {
        args.push("--data-binary".to_string());
        args.push(shell_quote(&String::from_utf8_lossy(body)));
    }

    // curl derives these from the URL and the body itself.
    let mut header_lines: Vec<String> = headers
        .iter()
        .filter(|(name, _)| **name != HOST && **name != CONTENT_LENGTH)
        .map(|(name, value)| {
            format!(
                "{}: {}",
                canonical_name(name),
                String::from_utf8_lossy(value.as_bytes())
            )
        })
        .collect();
    header_lines.sort();
    for line in header_lines {
        args.push("-H".to_string());
        args.push(shell_quote(&line));
    }

    args.push(shell_quote(url));
    args.join(" ")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// `content-type` → `Content-Type`.
fn canonical_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Expand every `\r` that isn't already followed by `\n` into `\r\n`.
fn normalize_line_endings(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter().peekable();
    while let Some(&b) = bytes.next() {
        out.push(b);
        if b == b'\r' && bytes.peek() != Some(&&b'\n') {
            out.push(b'\n');
        }
    }
    out
}
