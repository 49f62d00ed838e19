//! Core HTTP forwarding handler.
//!
//! [`forward_handler`] is the Axum fallback that receives every inbound
//! request. Each request walks the stages of [`Stage`]:
//!
//! ```text
//! Received -> SchemaChecked -> HeadersPrepared -> Forwarded -> ResponseRelayed
//!     |              |                |               |
//!     +-> Rejected   +----------------+---------------+-> Failed
//! ```
//!
//! Submodules handle target resolution ([`target`]), header hygiene
//! ([`headers`]), transcripts ([`recorder`]), body capture and tee
//! ([`body`]) and the upstream call ([`client`]).

pub mod body;
pub mod client;
pub mod headers;
pub mod recorder;
pub mod target;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Local;
use hyper::body::{Body as _, Incoming};

use crate::config::ForwardMode;
use crate::error::ForwardError;
use crate::server::AppState;
use body::{response_has_no_body, CapturedBody, ResponseHead, ResponseTee};
use client::OutboundRequest;

/// Where a request is in its lifecycle. Used to tag diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    SchemaChecked,
    HeadersPrepared,
    Forwarded,
    ResponseRelayed,
    Rejected,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::SchemaChecked => "schema_checked",
            Self::HeadersPrepared => "headers_prepared",
            Self::Forwarded => "forwarded",
            Self::ResponseRelayed => "response_relayed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl Stage {
    /// Terminal stage a failure at `self` lands in.
    #[must_use]
    pub fn on_error(self, err: &ForwardError) -> Self {
        match (self, err) {
            (Self::Received, ForwardError::UnsupportedScheme { .. }) => Self::Rejected,
            _ => Self::Failed,
        }
    }
}

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let received_at = Local::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let (parts, body) = request.into_parts();

    // Received: capture the body prefix once, record, then decide.
    let mut captured = CapturedBody::capture(body, state.config.record_limit).await;
    state.sink.emit(&recorder::request_block(
        received_at,
        &parts,
        &captured.excerpt(),
    ));

    if let Some(e) = captured.take_error() {
        let err = ForwardError::BodyRead {
            source: Box::new(e),
        };
        tracing::warn!(
            request_id = %request_id,
            stage = %Stage::Received.on_error(&err),
            error = %err,
            "request aborted"
        );
        return err.into_response();
    }

    let upstream = match target::resolve_upstream(&parts.uri, state.config.target.as_ref()) {
        Ok(uri) => uri,
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                stage = %Stage::Received.on_error(&err),
                method = %parts.method,
                uri = %parts.uri,
                "{err}"
            );
            captured.discard().await;
            return err.into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        stage = %Stage::SchemaChecked,
        upstream = %upstream,
        "scheme accepted"
    );

    if state.config.mode == ForwardMode::RecordOnly {
        let size = captured.discard().await;
        tracing::info!(
            request_id = %request_id,
            method = %parts.method,
            upstream = %upstream,
            body_bytes = size,
            "recorded, not forwarded"
        );
        return StatusCode::OK.into_response();
    }

    // SchemaChecked -> HeadersPrepared
    let client_ip = addr.ip().to_string();
    let outbound = OutboundRequest {
        method: parts.method.clone(),
        uri: upstream.clone(),
        headers: headers::prepare_outbound(&parts.headers, &state.skip, &client_ip),
        body: captured.into_body(),
    };

    tracing::info!(
        request_id = %request_id,
        stage = %Stage::HeadersPrepared,
        method = %parts.method,
        upstream = %upstream,
        client = %client_ip,
        "forwarding request"
    );

    // HeadersPrepared -> Forwarded
    let response = match state.client.forward(outbound).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(
                request_id = %request_id,
                stage = %Stage::HeadersPrepared.on_error(&err),
                upstream = %upstream,
                error = %err,
                "upstream call failed"
            );
            return err.into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        stage = %Stage::Forwarded,
        upstream = %upstream,
        status = response.status().as_u16(),
        "upstream responded"
    );

    // Forwarded -> ResponseRelayed (completes as the body streams out)
    relay_response(&state, &parts.method, response, request_id)
}

/// Copy status and filtered headers, then stream the body through a tee.
///
/// Status and headers are committed when this returns; a failure while
/// the body streams can only be logged and end the caller's connection.
/// Bodiless responses are recorded here, as the server never polls them.
fn relay_response(
    state: &AppState,
    method: &Method,
    response: Response<Incoming>,
    request_id: String,
) -> Response {
    let (parts, body) = response.into_parts();
    let bodiless = response_has_no_body(method, parts.status) || body.is_end_stream();
    let headers = state.skip.filter(&parts.headers);
    let head = ResponseHead {
        status: parts.status,
        version: parts.version,
        headers: parts.headers,
    };

    let tee = ResponseTee::new(
        body,
        head,
        Arc::clone(&state.sink),
        state.config.record_limit,
        state.config.body_idle_timeout,
        request_id,
    );

    let body = if bodiless {
        tee.close_empty()
    } else {
        tee.into_body()
    };

    let mut relayed = Response::new(body);
    *relayed.status_mut() = parts.status;
    *relayed.headers_mut() = headers;
    relayed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_failure_before_forwarding_is_a_rejection() {
        let err = ForwardError::UnsupportedScheme {
            scheme: "ftp".into(),
        };
        assert_eq!(Stage::Received.on_error(&err), Stage::Rejected);
    }

    #[test]
    fn upstream_failure_is_terminal_failure() {
        let err = ForwardError::UpstreamTimeout { timeout_ms: 10 };
        assert_eq!(Stage::HeadersPrepared.on_error(&err), Stage::Failed);

        let err = ForwardError::BodyRead {
            source: "reset".into(),
        };
        assert_eq!(Stage::Received.on_error(&err), Stage::Failed);
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(Stage::SchemaChecked.to_string(), "schema_checked");
        assert_eq!(Stage::ResponseRelayed.to_string(), "response_relayed");
    }
}
