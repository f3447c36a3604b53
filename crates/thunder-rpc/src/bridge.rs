// crates/thunder-rpc/src/bridge.rs
//
// MetadataBridge: HTTP headers -> call metadata for the REST and GraphQL
// front ends.
//
// The `authorization` header is special-cased: it is always carried, whatever
// casing the caller used, exactly once, and gets a `Bearer ` prefix when the
// value names no known auth scheme. Every other header goes through a
// HeaderMatcher that decides whether and under which name it is forwarded.
// `current_user` is reserved for AuthStage and never taken from the caller.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use thunder_core::{CallMetadata, AUTHORIZATION, CURRENT_USER};

use crate::context::CallContext;

/// Schemes left untouched when normalizing an authorization value.
const KNOWN_SCHEMES: [&str; 6] = ["bearer", "basic", "digest", "negotiate", "token", "apikey"];

/// Decides which non-authorization headers are forwarded into metadata.
pub trait HeaderMatcher: Send + Sync {
    /// Metadata key for `header`, or `None` to drop it.
    fn matches(&self, header: &str) -> Option<String>;
}

impl<F> HeaderMatcher for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn matches(&self, header: &str) -> Option<String> {
        self(header)
    }
}

/// Forward every header under its lower-cased name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardAll;

impl HeaderMatcher for ForwardAll {
    fn matches(&self, header: &str) -> Option<String> {
        Some(header.to_ascii_lowercase())
    }
}

/// Forward only the listed headers (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl HeaderMatcher for AllowList {
    fn matches(&self, header: &str) -> Option<String> {
        let lowered = header.to_ascii_lowercase();
        self.names.contains(&lowered).then_some(lowered)
    }
}

/// Metadata produced for one inbound HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgedMetadata {
    /// What the admission stages and handler read.
    pub incoming: CallMetadata,
    /// What the handler forwards on calls it makes in turn.
    pub outgoing: CallMetadata,
}

#[derive(Clone)]
pub struct MetadataBridge {
    matcher: Arc<dyn HeaderMatcher>,
}

impl fmt::Debug for MetadataBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataBridge").finish_non_exhaustive()
    }
}

impl Default for MetadataBridge {
    fn default() -> Self {
        Self::new(ForwardAll)
    }
}

impl MetadataBridge {
    pub fn new(matcher: impl HeaderMatcher + 'static) -> Self {
        Self {
            matcher: Arc::new(matcher),
        }
    }

    /// Translate an HTTP header map. Values that are not valid UTF-8 are skipped.
    pub fn translate(&self, headers: &HeaderMap) -> BridgedMetadata {
        self.translate_pairs(
            headers
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        )
    }

    /// Translate raw `(name, value)` pairs as received, in order.
    pub fn translate_pairs<'a, I>(&self, headers: I) -> BridgedMetadata
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut authorization: Option<String> = None;
        let mut forwarded: Vec<(String, String)> = Vec::new();

        for (name, value) in headers {
            if name.eq_ignore_ascii_case(AUTHORIZATION) {
                if authorization.is_none() && !value.trim().is_empty() {
                    authorization = Some(normalize_authorization(value));
                }
                continue;
            }
            if let Some(key) = self.matcher.matches(name) {
                let key = key.to_ascii_lowercase();
                if key == CURRENT_USER {
                    tracing::debug!(header = %name, "dropping caller-supplied identity header");
                    continue;
                }
                forwarded.push((key, value.to_string()));
            }
        }

        if let Some(value) = authorization {
            forwarded.push((AUTHORIZATION.to_string(), value));
        }

        let incoming = CallMetadata::from_pairs(forwarded);
        BridgedMetadata {
            outgoing: incoming.clone(),
            incoming,
        }
    }

    /// Attach the translated metadata to `ctx` as both inbound and outbound.
    pub fn apply(&self, headers: &HeaderMap, ctx: CallContext) -> CallContext {
        let bridged = self.translate(headers);
        ctx.with_metadata(bridged.incoming)
            .with_outgoing(bridged.outgoing)
    }
}

/// Prefix `Bearer ` unless the value already starts with a known scheme.
fn normalize_authorization(value: &str) -> String {
    let value = value.trim();
    let scheme = value.split_whitespace().next().unwrap_or_default();
    if KNOWN_SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
        value.to_string()
    } else {
        format!("Bearer {}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderName, HeaderValue};

    #[test]
    fn test_authorization_survives_any_casing() {
        let bridge = MetadataBridge::default();
        for name in ["Authorization", "authorization", "AUTHORIZATION", "aUtHoRiZaTiOn"] {
            let md = bridge.translate_pairs([(name, "Bearer xyz")]).incoming;
            assert_eq!(md.get_all(AUTHORIZATION), vec!["Bearer xyz"], "{}", name);
            assert_eq!(md.bearer_token(), Some("xyz"));
        }
    }

    #[test]
    fn test_authorization_survives_restrictive_matcher() {
        let bridge = MetadataBridge::new(|_: &str| None::<String>);
        let md = bridge
            .translate_pairs([("Authorization", "Bearer xyz"), ("x-request-id", "r1")])
            .incoming;
        assert_eq!(md.len(), 1);
        assert_eq!(md.bearer_token(), Some("xyz"));
    }

    #[test]
    fn test_duplicate_authorization_collapses_to_one() {
        let md = MetadataBridge::default()
            .translate_pairs([("Authorization", "Bearer first"), ("authorization", "Bearer second")])
            .incoming;
        assert_eq!(md.get_all(AUTHORIZATION), vec!["Bearer first"]);
    }

    #[test]
    fn test_bearer_prefix_added_when_scheme_unknown() {
        let bridge = MetadataBridge::default();
        let cases = [
            ("xyz", "Bearer xyz"),
            ("  xyz ", "Bearer xyz"),
            ("bearer xyz", "bearer xyz"),
            ("Basic dXNlcjpwYXNz", "Basic dXNlcjpwYXNz"),
            ("ApiKey k1", "ApiKey k1"),
            ("Token t1", "Token t1"),
        ];
        for (raw, expected) in cases {
            let md = bridge.translate_pairs([("Authorization", raw)]).incoming;
            assert_eq!(md.get(AUTHORIZATION), Some(expected), "{}", raw);
        }
    }

    #[test]
    fn test_blank_authorization_dropped() {
        let md = MetadataBridge::default()
            .translate_pairs([("Authorization", "   ")])
            .incoming;
        assert!(!md.contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_allow_list_filters_other_headers() {
        let bridge = MetadataBridge::new(AllowList::new(["X-Request-Id"]));
        let md = bridge
            .translate_pairs([("X-Request-Id", "r1"), ("Cookie", "secret"), ("authorization", "t")])
            .incoming;
        assert_eq!(md.get("x-request-id"), Some("r1"));
        assert!(!md.contains_key("cookie"));
        assert_eq!(md.get(AUTHORIZATION), Some("Bearer t"));
    }

    #[test]
    fn test_closure_matcher_can_rename() {
        let bridge = MetadataBridge::new(|name: &str| {
            name.strip_prefix("Grpc-Metadata-")
                .map(|rest| rest.to_string())
        });
        let md = bridge
            .translate_pairs([("Grpc-Metadata-Tenant", "acme"), ("Accept", "*/*")])
            .incoming;
        assert_eq!(md.get("tenant"), Some("acme"));
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn test_translate_header_map_and_apply() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"AUTHORIZATION").unwrap(),
            HeaderValue::from_static("xyz"),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        headers.insert("x-binary", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());

        let bridge = MetadataBridge::default();
        let bridged = bridge.translate(&headers);
        assert_eq!(bridged.incoming, bridged.outgoing);
        assert_eq!(bridged.incoming.get(AUTHORIZATION), Some("Bearer xyz"));
        assert!(!bridged.incoming.contains_key("x-binary"));

        let ctx = bridge.apply(&headers, CallContext::new("GetUser"));
        assert_eq!(ctx.metadata().bearer_token(), Some("xyz"));
        assert_eq!(ctx.outgoing().bearer_token(), Some("xyz"));
        assert_eq!(ctx.metadata().get("x-forwarded-for"), Some("1.2.3.4"));
    }

    #[test]
    fn test_caller_cannot_supply_current_user() {
        let bridge = MetadataBridge::default();
        let md = bridge
            .translate_pairs([("Current_User", "admin@corp.example"), ("x-request-id", "r1")])
            .incoming;
        assert_eq!(md.current_user(), None);
        assert_eq!(md.get("x-request-id"), Some("r1"));

        let renaming = MetadataBridge::new(|name: &str| {
            name.strip_prefix("x-meta-").map(|rest| rest.to_string())
        });
        let bridged = renaming.translate_pairs([("x-meta-current_user", "admin@corp.example")]);
        assert!(bridged.incoming.is_empty());
        assert!(bridged.outgoing.is_empty());
    }

    #[test]
    fn test_empty_headers_yield_empty_metadata() {
        let bridged = MetadataBridge::default().translate(&HeaderMap::new());
        assert!(bridged.incoming.is_empty());
        assert!(bridged.outgoing.is_empty());
    }
}
