//! Outbound side of the proxy.
//!
//! [`ForwardingClient`] wraps the pooled hyper client. It builds a fresh
//! request from an [`OutboundRequest`], so nothing that only meant
//! something to the inbound connection (request extensions, the inbound
//! protocol version) leaks into the upstream call. There are no retries:
//! a failed upstream call is reported as a [`ForwardError`].

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::ForwardError;

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Body>;

/// The request as it will be sent upstream.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Body,
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

#[derive(Clone)]
pub struct ForwardingClient {
    http: HttpClient,
    timeout: Option<Duration>,
}

impl ForwardingClient {
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self::with_client(build_http_client(), timeout)
    }

    #[must_use]
    pub const fn with_client(http: HttpClient, timeout: Option<Duration>) -> Self {
        Self { http, timeout }
    }

    /// Send the request and wait for the upstream response head.
    ///
    /// The returned body is still streaming; dropping it releases the
    /// upstream connection.
    pub async fn forward(&self, outbound: OutboundRequest) -> Result<Response<Incoming>, ForwardError> {
        let mut request = Request::builder()
            .method(outbound.method)
            .uri(outbound.uri)
            .body(outbound.body)
            .map_err(|e| ForwardError::InvalidUpstreamUri {
                reason: e.to_string(),
            })?;
        *request.headers_mut() = outbound.headers;

        let call = self.http.request(request);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ForwardError::UpstreamTimeout {
                    timeout_ms: limit.as_millis(),
                })?,
            None => call.await,
        };

        result.map_err(classify)
    }
}

fn classify(err: hyper_util::client::legacy::Error) -> ForwardError {
    if err.is_connect() {
        ForwardError::UpstreamUnreachable {
            source: Box::new(err),
        }
    } else {
        ForwardError::Upstream {
            source: Box::new(err),
        }
    }
}
