use crate::error::GatewayError;
use http::uri::Authority;
use http::Uri;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A route target URI.
///
/// `http::Uri` rejects opaque forms such as `lb:http://users` or
/// `forward:/local`, so route targets keep their own parsed view: scheme,
/// scheme-specific part and, for hierarchical URIs, authority/path/query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUri {
    raw: String,
    scheme: String,
    scheme_specific_part: String,
    authority: Option<Authority>,
    path: Option<String>,
    query: Option<String>,
}

impl RouteUri {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn scheme_specific_part(&self) -> &str {
        &self.scheme_specific_part
    }

    pub fn authority(&self) -> Option<&Authority> {
        self.authority.as_ref()
    }

    pub fn host(&self) -> Option<&str> {
        self.authority.as_ref().map(|a| a.host())
    }

    /// Raw path; `None` when empty or when the URI is opaque.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True for `outer:inner://...` forms, where the scheme-specific part is
    /// itself a URI and there is no host or path at the outer level.
    pub fn has_another_scheme(&self) -> bool {
        self.authority.is_none()
            && self.path.is_none()
            && split_scheme(&self.scheme_specific_part).is_some()
    }
}

impl FromStr for RouteUri {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let without_fragment = raw.split('#').next().unwrap_or(raw);
        let (scheme, ssp) = split_scheme(without_fragment)
            .ok_or_else(|| GatewayError::InvalidDefinition(format!("uri '{}' has no scheme", raw)))?;

        let mut authority = None;
        let rest = if let Some(hier) = ssp.strip_prefix("//") {
            let end = hier.find(['/', '?']).unwrap_or(hier.len());
            let auth = &hier[..end];
            if !auth.is_empty() {
                authority = Some(auth.parse::<Authority>().map_err(|e| {
                    GatewayError::InvalidDefinition(format!("uri '{}': {}", raw, e))
                })?);
            }
            Some(&hier[end..])
        } else if ssp.starts_with('/') {
            Some(ssp)
        } else {
            None
        };

        let (path, query) = match rest {
            Some(rest) => {
                let (p, q) = match rest.split_once('?') {
                    Some((p, q)) => (p, Some(q)),
                    None => (rest, None),
                };
                (
                    (!p.is_empty()).then(|| p.to_string()),
                    q.filter(|q| !q.is_empty()).map(str::to_string),
                )
            }
            None => (None, None),
        };

        Ok(RouteUri {
            raw: raw.to_string(),
            scheme: scheme.to_ascii_lowercase(),
            scheme_specific_part: ssp.to_string(),
            authority,
            path,
            query,
        })
    }
}

impl fmt::Display for RouteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for RouteUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for RouteUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Splits `scheme:rest`, validating the scheme grammar
/// (`ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`).
fn split_scheme(s: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = s.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme, rest))
}

/// True if the raw path or query of `uri` already carries percent-escapes.
pub fn contains_encoded_parts(uri: &Uri) -> bool {
    uri.path().contains('%') || uri.query().is_some_and(|q| q.contains('%'))
}

/// Overlay `route` onto `request`: scheme from the route, authority from the
/// route when it has one, path and query from the route when non-empty.
///
/// With `encoded` set the raw text is passed through; otherwise characters
/// that are not legal in a URI (including `%`) are percent-encoded.
pub fn merge_request_url(
    request: &Uri,
    route: &RouteUri,
    encoded: bool,
) -> Result<Uri, GatewayError> {
    let authority = route
        .authority()
        .map(Authority::as_str)
        .or_else(|| request.authority().map(Authority::as_str))
        .ok_or_else(|| {
            GatewayError::InvalidRequest(format!("no authority for target {}", route))
        })?;
    let path = route.path().unwrap_or_else(|| request.path());
    let query = route.query().or_else(|| request.query());

    let mut out = String::with_capacity(route.scheme().len() + authority.len() + path.len() + 16);
    out.push_str(route.scheme());
    out.push_str("://");
    out.push_str(authority);
    push_component(&mut out, path, encoded);
    if let Some(q) = query {
        out.push('?');
        push_component(&mut out, q, encoded);
    }

    out.parse::<Uri>()
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid target uri '{}': {}", out, e)))
}

/// Returns `uri` with its path replaced, keeping scheme, authority and query.
pub fn with_path(uri: &Uri, path: &str) -> Result<Uri, GatewayError> {
    let pq = match uri.query() {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    };
    rebuild(uri, &pq)
}

/// Returns `uri` with its query replaced.
pub fn with_query(uri: &Uri, query: &str) -> Result<Uri, GatewayError> {
    let pq = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };
    rebuild(uri, &pq)
}

fn rebuild(uri: &Uri, path_and_query: &str) -> Result<Uri, GatewayError> {
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().map_err(|e| {
        GatewayError::InvalidRequest(format!("invalid uri '{}': {}", path_and_query, e))
    })?);
    Uri::from_parts(parts)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid uri: {}", e)))
}

fn push_component(out: &mut String, component: &str, encoded: bool) {
    if encoded {
        out.push_str(component);
        return;
    }
    for b in component.bytes() {
        if is_uri_char(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(hex_digit(b >> 4));
            out.push(hex_digit(b & 0x0f));
        }
    }
}

fn is_uri_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.'
                | b'_'
                | b'~'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b':'
                | b'@'
                | b'/'
                | b'?'
        )
}

fn hex_digit(n: u8) -> char {
    char::from(b"0123456789ABCDEF"[n as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hierarchical_uri() {
        let uri: RouteUri = "http://backend:8080/base?x=1".parse().unwrap();
        assert_eq!(uri.scheme(), "http");
        assert_eq!(uri.host(), Some("backend"));
        assert_eq!(uri.authority().unwrap().port_u16(), Some(8080));
        assert_eq!(uri.path(), Some("/base"));
        assert_eq!(uri.query(), Some("x=1"));
        assert!(!uri.has_another_scheme());
    }

    #[test]
    fn empty_path_is_none() {
        let uri: RouteUri = "http://backend".parse().unwrap();
        assert_eq!(uri.path(), None);
        assert_eq!(uri.query(), None);
    }

    #[test]
    fn nested_scheme_is_detected() {
        let uri: RouteUri = "lb:http://my-service".parse().unwrap();
        assert_eq!(uri.scheme(), "lb");
        assert!(uri.has_another_scheme());
        assert_eq!(uri.scheme_specific_part(), "http://my-service");
    }

    #[test]
    fn lb_authority_form_has_no_nested_scheme() {
        let uri: RouteUri = "lb://users".parse().unwrap();
        assert_eq!(uri.scheme(), "lb");
        assert_eq!(uri.host(), Some("users"));
        assert!(!uri.has_another_scheme());
    }

    #[test]
    fn forward_path_form() {
        let uri: RouteUri = "forward:/local/health".parse().unwrap();
        assert_eq!(uri.scheme(), "forward");
        assert_eq!(uri.path(), Some("/local/health"));
        assert!(uri.authority().is_none());
        assert!(!uri.has_another_scheme());
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!("backend:8080".parse::<RouteUri>().is_ok());
        assert!("/just/a/path".parse::<RouteUri>().is_err());
        assert!("1http://x".parse::<RouteUri>().is_err());
    }

    #[test]
    fn merge_takes_request_path_when_route_has_none() {
        let request: Uri = "http://gw/api/x?y=2".parse().unwrap();
        let route: RouteUri = "https://backend:9443".parse().unwrap();
        let merged = merge_request_url(&request, &route, false).unwrap();
        assert_eq!(merged.to_string(), "https://backend:9443/api/x?y=2");
    }

    #[test]
    fn merge_takes_route_path_and_query_when_present() {
        let request: Uri = "http://gw/api/x?y=2".parse().unwrap();
        let route: RouteUri = "http://backend/fixed?z=3".parse().unwrap();
        let merged = merge_request_url(&request, &route, false).unwrap();
        assert_eq!(merged.to_string(), "http://backend/fixed?z=3");
    }

    #[test]
    fn merge_keeps_request_authority_for_hostless_route() {
        let request: Uri = "http://gw/a".parse().unwrap();
        let route: RouteUri = "forward:/local".parse().unwrap();
        let merged = merge_request_url(&request, &route, false).unwrap();
        assert_eq!(merged.to_string(), "forward://gw/local");
    }

    #[test]
    fn merge_encoded_passes_escapes_through() {
        let request: Uri = "http://gw/a%20b".parse().unwrap();
        assert!(contains_encoded_parts(&request));
        let route: RouteUri = "http://backend".parse().unwrap();
        let merged = merge_request_url(&request, &route, true).unwrap();
        assert_eq!(merged.path(), "/a%20b");
    }

    #[test]
    fn merge_unencoded_escapes_percent() {
        let request: Uri = "http://gw/a".parse().unwrap();
        let route: RouteUri = "http://backend/100%".parse().unwrap();
        let merged = merge_request_url(&request, &route, false).unwrap();
        assert_eq!(merged.path(), "/100%25");
    }

    #[test]
    fn with_path_keeps_query() {
        let uri: Uri = "http://gw/a?b=1".parse().unwrap();
        let out = with_path(&uri, "/prefix/a").unwrap();
        assert_eq!(out.to_string(), "http://gw/prefix/a?b=1");
    }

    #[test]
    fn with_query_replaces_query() {
        let uri: Uri = "http://gw/a?b=1".parse().unwrap();
        let out = with_query(&uri, "b=1&c=2").unwrap();
        assert_eq!(out.to_string(), "http://gw/a?b=1&c=2");
    }

    #[test]
    fn serde_roundtrips_as_string() {
        let uri: RouteUri = serde_json::from_str(r#""lb://users""#).unwrap();
        assert_eq!(uri.host(), Some("users"));
        assert_eq!(serde_json::to_string(&uri).unwrap(), r#""lb://users""#);
    }
}
