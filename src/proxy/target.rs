//! Upstream target resolution.
//!
//! Decides where a request goes: either to the configured [`TargetBase`]
//! (transparent mode, the request's own host is ignored) or to the
//! absolute URI the caller asked for (forward-proxy mode). The effective
//! scheme is checked here, before anything is sent.

use axum::http::uri::PathAndQuery;
use axum::http::Uri;
use url::{Position, Url};

use crate::error::ForwardError;

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Base URL every request is rewritten onto when transparent mode is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBase {
    url: Url,
}

impl TargetBase {
    /// Parse and check a base URL. Returns a human-readable reason on failure.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| format!("not a valid URL ({e})"))?;
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(format!(
                "unsupported scheme '{}' (expected http or https)",
                url.scheme()
            ));
        }
        if url.host_str().is_none() {
            return Err("URL has no host".into());
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err("base URL cannot carry a query or fragment".into());
        }
        Ok(Self { url })
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Graft the inbound path and query onto the base URL.
    fn join(&self, path_and_query: Option<&PathAndQuery>) -> String {
        let origin = &self.url[..Position::BeforePath];
        let base_path = self.url.path().trim_end_matches('/');
        let (path, query) = path_and_query.map_or(("/", None), |pq| (pq.path(), pq.query()));
        let path = if path.is_empty() { "/" } else { path };

        let mut joined = format!("{origin}{base_path}{path}");
        if let Some(query) = query {
            joined.push('?');
            joined.push_str(query);
        }
        joined
    }
}

impl std::fmt::Display for TargetBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// The scheme the request will actually be sent with.
#[must_use]
pub fn effective_scheme<'a>(uri: &'a Uri, target: Option<&'a TargetBase>) -> &'a str {
    match target {
        Some(target) => target.scheme(),
        None => uri.scheme_str().unwrap_or(""),
    }
}

/// Check the effective scheme and compute the absolute upstream URI.
pub fn resolve_upstream(uri: &Uri, target: Option<&TargetBase>) -> Result<Uri, ForwardError> {
    let scheme = effective_scheme(uri, target);
    if !ALLOWED_SCHEMES.contains(&scheme) {
        return Err(ForwardError::UnsupportedScheme {
            scheme: scheme.to_string(),
        });
    }

    match target {
        Some(target) => target
            .join(uri.path_and_query())
            .parse::<Uri>()
            .map_err(|e| ForwardError::InvalidUpstreamUri {
                reason: e.to_string(),
            }),
        None if uri.authority().is_none() => Err(ForwardError::InvalidUpstreamUri {
            reason: format!("request URI '{uri}' has no host"),
        }),
        None => Ok(uri.clone()),
    }
}
