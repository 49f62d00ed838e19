//! Single-pass body handling shared by the recorder and the forwarder.
//!
//! Request side: [`CapturedBody::capture`] reads at most `limit` bytes
//! (rounded up to the chunk that crosses it) so the transcript can be
//! written before anything is sent. [`CapturedBody::into_body`] then
//! replays that prefix ahead of the untouched remainder of the stream.
//!
//! Response side: [`ResponseTee`] sits between the upstream body and the
//! caller. Every chunk is passed through as soon as it arrives, and the
//! first `limit` bytes are copied aside for the response transcript,
//! which is emitted when the stream ends. Responses that cannot carry a
//! body are recorded at once with [`ResponseTee::close_empty`], since
//! the server never polls their body.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode, Version};
use bytes::{Bytes, BytesMut};
use futures_util::{future, stream, StreamExt};
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;

use super::recorder::{self, BodyExcerpt, TranscriptSink};
use super::Stage;
use crate::error::ForwardError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Inbound body with its first bytes already read.
#[derive(Debug)]
pub struct CapturedBody {
    head: Bytes,
    rest: Option<Body>,
    error: Option<axum::Error>,
}

impl CapturedBody {
    pub async fn capture(mut body: Body, limit: usize) -> Self {
        let mut head = BytesMut::new();
        loop {
            if head.len() >= limit {
                let rest = (!body.is_end_stream()).then_some(body);
                return Self {
                    head: head.freeze(),
                    rest,
                    error: None,
                };
            }
            match body.frame().await {
                None => {
                    return Self {
                        head: head.freeze(),
                        rest: None,
                        error: None,
                    }
                }
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        head.extend_from_slice(&data);
                    }
                }
                Some(Err(e)) => {
                    return Self {
                        head: head.freeze(),
                        rest: None,
                        error: Some(e),
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn excerpt(&self) -> BodyExcerpt<'_> {
        BodyExcerpt {
            bytes: &self.head,
            truncated: self.rest.is_some(),
            total: None,
        }
    }

    /// The read error that stopped the capture, if any.
    pub fn take_error(&mut self) -> Option<axum::Error> {
        self.error.take()
    }

    /// Rebuild a streaming body: captured prefix first, then the rest.
    #[must_use]
    pub fn into_body(self) -> Body {
        let Self { head, rest, .. } = self;
        match rest {
            None => Body::from(head),
            Some(rest) => {
                let head = stream::once(future::ready(Ok::<_, axum::Error>(head)));
                Body::from_stream(head.chain(rest.into_data_stream()))
            }
        }
    }

    /// Read and drop whatever is left. Returns the body size seen.
    pub async fn discard(self) -> u64 {
        let mut seen = self.head.len() as u64;
        if let Some(mut rest) = self.rest {
            while let Some(frame) = rest.frame().await {
                match frame {
                    Ok(frame) => {
                        if let Some(data) = frame.data_ref() {
                            seen += data.len() as u64;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "request body ended early while discarding");
                        break;
                    }
                }
            }
        }
        seen
    }
}

/// Status line and headers as received from the origin.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

/// True when a response to `method` with `status` has no body on the
/// wire (RFC 9110 §6.4.1).
#[must_use]
pub fn response_has_no_body(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Tee between the upstream response body and the caller.
pub struct ResponseTee<B> {
    body: B,
    head: ResponseHead,
    captured: BytesMut,
    limit: usize,
    relayed: u64,
    idle_timeout: Option<Duration>,
    sink: Arc<dyn TranscriptSink>,
    request_id: String,
    done: bool,
}

impl<B> ResponseTee<B>
where
    B: HttpBody<Data = Bytes> + Unpin + Send + 'static,
    B::Error: Into<BoxError>,
{
    pub fn new(
        body: B,
        head: ResponseHead,
        sink: Arc<dyn TranscriptSink>,
        limit: usize,
        idle_timeout: Option<Duration>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            body,
            head,
            captured: BytesMut::new(),
            limit,
            relayed: 0,
            idle_timeout,
            sink,
            request_id: request_id.into(),
            done: false,
        }
    }

    /// Turn the tee into the body handed back to the caller.
    ///
    /// If the caller goes away, the stream is dropped and with it the
    /// upstream body, which releases the upstream connection.
    pub fn into_body(self) -> Body {
        Body::from_stream(stream::unfold(self, |mut tee| async move {
            if tee.done {
                return None;
            }
            match tee.next_chunk().await {
                Ok(Some(chunk)) => {
                    tee.observe(&chunk);
                    Some((Ok(chunk), tee))
                }
                Ok(None) => {
                    tee.finish();
                    None
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %tee.request_id,
                        relayed_bytes = tee.relayed,
                        error = %e,
                        "response body relay failed"
                    );
                    tee.finish();
                    Some((Err(e), tee))
                }
            }
        }))
    }

    /// Record the response with an empty body and drop the upstream body.
    ///
    /// The returned body has no size hint, so the server keeps the
    /// origin's `Content-Length` on HEAD responses.
    pub fn close_empty(mut self) -> Body {
        self.finish();
        Body::from_stream(stream::empty::<Result<Bytes, BoxError>>())
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ForwardError> {
        loop {
            let frame = match self.idle_timeout {
                Some(idle) => tokio::time::timeout(idle, self.body.frame())
                    .await
                    .map_err(|_| ForwardError::BodyStalled {
                        timeout_ms: idle.as_millis(),
                    })?,
                None => self.body.frame().await,
            };
            match frame {
                None => return Ok(None),
                Some(Ok(frame)) => {
                    // trailers are hop-by-hop and are not relayed
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some(data));
                    }
                }
                Some(Err(e)) => {
                    return Err(ForwardError::ResponseCopy { source: e.into() });
                }
            }
        }
    }

    fn observe(&mut self, chunk: &Bytes) {
        self.relayed += chunk.len() as u64;
        let room = self.limit.saturating_sub(self.captured.len());
        if room > 0 {
            let take = room.min(chunk.len());
            self.captured.extend_from_slice(&chunk[..take]);
        }
    }

    fn finish(&mut self) {
        self.done = true;
        let excerpt = BodyExcerpt {
            bytes: &self.captured,
            truncated: self.relayed > self.captured.len() as u64,
            total: Some(self.relayed),
        };
        let block = recorder::response_block(
            self.head.status,
            self.head.version,
            &self.head.headers,
            &excerpt,
        );
        self.sink.emit(&block);
        tracing::debug!(
            request_id = %self.request_id,
            stage = %Stage::ResponseRelayed,
            relayed_bytes = self.relayed,
            "response body relayed"
        );
    }
}

impl<B> Drop for ResponseTee<B> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!(
                request_id = %self.request_id,
                relayed_bytes = self.relayed,
                "caller went away before the response body was relayed"
            );
        }
    }
}
