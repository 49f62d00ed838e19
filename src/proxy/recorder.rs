//! Human-readable request/response transcripts.
//!
//! Rendering is pure: the functions here only format what they are
//! given and never touch the message being forwarded. Bodies arrive as a
//! [`BodyExcerpt`], the bounded prefix captured by [`super::body`].
//! Finished blocks are handed to a [`TranscriptSink`].

use std::io::Write;
use std::sync::Mutex;

use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode, Version};
use chrono::{DateTime, Local};

pub const REQUEST_END: &str = "-------------------- request end -------------------------";
pub const RESPONSE_END: &str = "-------------------- response end -------------------------";
pub const BODY_START: &str = "=== body START ===";
pub const BODY_END: &str = "=== body END ===";

/// The recorded part of a body.
#[derive(Debug, Clone, Copy)]
pub struct BodyExcerpt<'a> {
    pub bytes: &'a [u8],
    pub truncated: bool,
    /// Total bytes seen, when known (response side).
    pub total: Option<u64>,
}

impl<'a> BodyExcerpt<'a> {
    #[must_use]
    pub const fn complete(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            truncated: false,
            total: None,
        }
    }
}

/// Methods whose body is shown in the request transcript.
#[must_use]
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

#[must_use]
pub fn timestamp_line(received_at: DateTime<Local>) -> String {
    format!(
        "Request received {}",
        received_at.format("%Y-%m-%d %H:%M:%S%.6f")
    )
}

/// `METHOD URL PROTOCOL`, `Host:`, header lines, then the body section
/// for body-carrying methods.
#[must_use]
pub fn render_request(parts: &Parts, body: &BodyExcerpt<'_>) -> String {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(ToString::to_string))
        .unwrap_or_default();

    let mut lines = vec![
        format!("{} {} {}", parts.method, parts.uri, version_str(parts.version)),
        format!("Host: {host}"),
    ];
    push_headers(&mut lines, &parts.headers, true);

    if carries_body(&parts.method) {
        push_body(&mut lines, body);
    }
    lines.join("\n")
}

/// Status line, header lines, then the body section.
#[must_use]
pub fn render_response(
    status: StatusCode,
    version: Version,
    headers: &HeaderMap,
    body: &BodyExcerpt<'_>,
) -> String {
    let mut lines = vec![format!("{} {status}", version_str(version))];
    push_headers(&mut lines, headers, false);
    push_body(&mut lines, body);
    lines.join("\n")
}

/// Timestamp, request transcript and the request separator.
#[must_use]
pub fn request_block(received_at: DateTime<Local>, parts: &Parts, body: &BodyExcerpt<'_>) -> String {
    format!(
        "{}\n{}\n{REQUEST_END}\n",
        timestamp_line(received_at),
        render_request(parts, body)
    )
}

/// Response transcript and the response separator.
#[must_use]
pub fn response_block(
    status: StatusCode,
    version: Version,
    headers: &HeaderMap,
    body: &BodyExcerpt<'_>,
) -> String {
    format!(
        "{}\n{RESPONSE_END}\n",
        render_response(status, version, headers, body)
    )
}

fn push_headers(lines: &mut Vec<String>, headers: &HeaderMap, skip_host: bool) {
    for (name, value) in headers {
        if skip_host && *name == HOST {
            continue;
        }
        // header names are already lower-case in `http`
        lines.push(format!(
            "{}: {}",
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes())
        ));
    }
}

fn push_body(lines: &mut Vec<String>, body: &BodyExcerpt<'_>) {
    lines.push(BODY_START.to_string());
    lines.push(String::from_utf8_lossy(body.bytes).into_owned());
    if body.truncated {
        let recorded = body.bytes.len();
        lines.push(match body.total {
            Some(total) => format!("[... truncated, {recorded} of {total} bytes recorded]"),
            None => format!("[... truncated, {recorded} bytes recorded]"),
        });
    }
    lines.push(BODY_END.to_string());
}

const fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Destination for finished transcript blocks.
pub trait TranscriptSink: Send + Sync {
    fn emit(&self, block: &str);
}

/// Writes each block to stdout in one locked write, so blocks from
/// concurrent requests never interleave line by line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl TranscriptSink for StdoutSink {
    fn emit(&self, block: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(block.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "failed to write transcript");
        }
    }
}

/// Keeps blocks in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    blocks: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn blocks(&self) -> Vec<String> {
        self.blocks
            .lock()
            .map(|blocks| blocks.clone())
            .unwrap_or_default()
    }
}

impl TranscriptSink for MemorySink {
    fn emit(&self, block: &str) {
        if let Ok(mut blocks) = self.blocks.lock() {
            blocks.push(block.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::TimeZone;

    fn parts(method: &str, uri: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", "example.test")
            .header("Content-Type", "text/plain")
            .header("Accept", "a")
            .header("Accept", "b")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn get_transcript_has_no_body_section() {
        let parts = parts("GET", "http://example.test/foo");
        let rendered = render_request(&parts, &BodyExcerpt::complete(b""));
        assert_eq!(
            rendered,
            "GET http://example.test/foo HTTP/1.1\n\
             Host: example.test\n\
             content-type: text/plain\n\
             accept: a\n\
             accept: b"
        );
    }

    #[test]
    fn post_transcript_includes_body_between_markers() {
        let parts = parts("POST", "/submit");
        let rendered = render_request(&parts, &BodyExcerpt::complete(b"name=value"));
        assert!(rendered.starts_with("POST /submit HTTP/1.1\nHost: example.test\n"));
        assert!(rendered.ends_with("=== body START ===\nname=value\n=== body END ==="));
    }

    #[test]
    fn host_falls_back_to_uri_authority() {
        let (parts, ()) = Request::builder()
            .uri("http://origin.test:8081/x")
            .body(())
            .unwrap()
            .into_parts();
        let rendered = render_request(&parts, &BodyExcerpt::complete(b""));
        assert!(rendered.contains("\nHost: origin.test:8081"));
    }

    #[test]
    fn binary_body_is_rendered_lossily() {
        let parts = parts("POST", "/bin");
        let rendered = render_request(&parts, &BodyExcerpt::complete(&[0xff, b'o', b'k']));
        assert!(rendered.contains("\u{fffd}ok"));
    }

    #[test]
    fn truncated_body_is_marked() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain".parse().unwrap());
        let body = BodyExcerpt {
            bytes: b"abc",
            truncated: true,
            total: Some(10),
        };
        let rendered = render_response(StatusCode::OK, Version::HTTP_11, &headers, &body);
        assert_eq!(
            rendered,
            "HTTP/1.1 200 OK\n\
             content-type: text/plain\n\
             === body START ===\n\
             abc\n\
             [... truncated, 3 of 10 bytes recorded]\n\
             === body END ==="
        );
    }

    #[test]
    fn request_block_has_timestamp_and_separator() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let block = request_block(at, &parts("GET", "/"), &BodyExcerpt::complete(b""));
        assert!(block.starts_with("Request received 2024-03-09 14:05:07.000000\nGET / HTTP/1.1\n"));
        assert!(block.ends_with(&format!("\n{REQUEST_END}\n")));
    }

    #[test]
    fn memory_sink_keeps_blocks_in_order() {
        let sink = MemorySink::new();
        sink.emit("one");
        sink.emit("two");
        assert_eq!(sink.blocks(), ["one", "two"]);
    }
}
