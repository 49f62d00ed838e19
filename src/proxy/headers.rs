//! Hop-by-hop stripping and `X-Forwarded-For` chaining.
//!
//! [`SkipSet`] is the fixed set of hop-by-hop header names. It is built
//! once at startup and handed to the handler through `AppState`.
//! [`SkipSet::filter`] removes those headers from a copy of a header map
//! (applied to both directions), and [`append_forwarded_for`] extends the
//! client chain with the caller's connection address.

use axum::http::header::{
    CONNECTION, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING,
    UPGRADE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Header names that only make sense for a single hop.
#[derive(Debug, Clone)]
pub struct SkipSet {
    names: Vec<HeaderName>,
}

impl Default for SkipSet {
    fn default() -> Self {
        Self::hop_by_hop()
    }
}

impl SkipSet {
    /// The RFC 2616 §13.5.1 list, plus `Trailer` as spelled by RFC 7230.
    #[must_use]
    pub fn hop_by_hop() -> Self {
        Self {
            names: vec![
                CONNECTION,
                HeaderName::from_static("keep-alive"),
                PROXY_AUTHENTICATE,
                PROXY_AUTHORIZATION,
                TE,
                HeaderName::from_static("trailers"),
                TRAILER,
                TRANSFER_ENCODING,
                UPGRADE,
            ],
        }
    }

    #[must_use]
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.names.contains(name)
    }

    #[must_use]
    pub fn names(&self) -> &[HeaderName] {
        &self.names
    }

    /// Copy `headers` without any entry whose name is in the set.
    ///
    /// Every remaining name keeps all of its values in their original
    /// order. `HeaderName` is lower-cased on parse, so the comparison is
    /// case-insensitive.
    #[must_use]
    pub fn filter(&self, headers: &HeaderMap) -> HeaderMap {
        let mut filtered = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            if !self.contains(name) {
                filtered.append(name.clone(), value.clone());
            }
        }
        filtered
    }
}

/// Append `client_ip` to the `X-Forwarded-For` chain.
///
/// Existing values (possibly split across several header lines) are
/// joined with `", "` and the new hop goes last. The result is stored as
/// a single header value. Earlier hops are never replaced, and bytes
/// outside visible ASCII are carried over as they are.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let mut chain: Vec<u8> = Vec::new();
    for hop in headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .map(|v| v.as_bytes().trim_ascii())
        .filter(|v| !v.is_empty())
    {
        chain.extend_from_slice(hop);
        chain.extend_from_slice(b", ");
    }
    chain.extend_from_slice(client_ip.as_bytes());

    match HeaderValue::from_bytes(&chain) {
        Ok(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        Err(e) => {
            tracing::warn!(
                client = client_ip,
                error = %e,
                "cannot extend x-forwarded-for, forwarding it unchanged"
            );
        }
    }
}

/// Headers for the upstream request: hop-by-hop stripped, `Host` dropped
/// so the client derives it from the upstream URI, caller appended to
/// `X-Forwarded-For`.
#[must_use]
pub fn prepare_outbound(original: &HeaderMap, skip: &SkipSet, client_ip: &str) -> HeaderMap {
    let mut headers = skip.filter(original);
    headers.remove(HOST);
    append_forwarded_for(&mut headers, client_ip);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert("proxy-authorization", "Basic Zm9vOmJhcg==".parse().unwrap());
        headers.insert("te", "trailers".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("upgrade", "websocket".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.append("accept", "text/html".parse().unwrap());
        headers.append("accept", "application/json".parse().unwrap());
        headers.append("accept", "*/*".parse().unwrap());
        headers
    }

    #[test]
    fn strips_every_hop_by_hop_header() {
        let skip = SkipSet::hop_by_hop();
        let filtered = skip.filter(&sample());

        for name in skip.names() {
            assert!(filtered.get(name).is_none(), "{name} survived filtering");
        }
        assert_eq!(filtered.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn keeps_all_values_in_order() {
        let filtered = SkipSet::hop_by_hop().filter(&sample());
        let accept: Vec<_> = filtered.get_all("accept").iter().collect();
        assert_eq!(accept, ["text/html", "application/json", "*/*"]);
    }

    #[test]
    fn matching_ignores_case() {
        let skip = SkipSet::hop_by_hop();
        let name = HeaderName::from_bytes(b"Keep-Alive").unwrap();
        assert!(skip.contains(&name));
        assert!(skip.contains(&HeaderName::from_bytes(b"TRAILERS").unwrap()));
    }

    #[test]
    fn filter_leaves_source_untouched() {
        let original = sample();
        let _ = SkipSet::hop_by_hop().filter(&original);
        assert!(original.get("connection").is_some());
    }

    #[test]
    fn sets_forwarded_for_when_absent() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1");
    }

    #[test]
    fn chains_hops_in_order() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        append_forwarded_for(&mut headers, "10.0.0.2");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1, 10.0.0.2");
    }

    #[test]
    fn merges_repeated_header_lines_into_one() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-for", "1.1.1.1".parse().unwrap());
        headers.append("x-forwarded-for", "2.2.2.2, 3.3.3.3".parse().unwrap());
        append_forwarded_for(&mut headers, "10.0.0.1");

        let values: Vec<_> = headers.get_all("x-forwarded-for").iter().collect();
        assert_eq!(values, ["1.1.1.1, 2.2.2.2, 3.3.3.3, 10.0.0.1"]);
    }

    #[test]
    fn keeps_undecodable_earlier_hops() {
        let mut headers = HeaderMap::new();
        headers.append(
            "x-forwarded-for",
            HeaderValue::from_bytes(b"caf\xe9.example").unwrap(),
        );
        headers.append("x-forwarded-for", "2.2.2.2".parse().unwrap());
        append_forwarded_for(&mut headers, "10.0.0.1");

        let values: Vec<_> = headers.get_all("x-forwarded-for").iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_bytes(), b"caf\xe9.example, 2.2.2.2, 10.0.0.1");
    }

    #[test]
    fn prepare_outbound_drops_host_and_hop_by_hop() {
        let mut original = sample();
        original.insert("host", "anything.test".parse().unwrap());
        original.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());

        let headers = prepare_outbound(&original, &SkipSet::hop_by_hop(), "10.0.0.1");

        assert!(headers.get("host").is_none());
        assert!(headers.get("connection").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "1.2.3.4, 10.0.0.1");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }
}
