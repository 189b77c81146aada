use super::{compile_full_match, Predicate, RoutePredicateFactory};
use crate::routing::binding::{require, unknown_field, BindConfig, BindError, NoConfig};
use http::HeaderName;
use regex::Regex;

#[derive(Debug, Default)]
pub struct HeaderConfig {
    pub header: Option<HeaderName>,
    pub regexp: Option<Regex>,
}

impl HeaderConfig {
    pub fn new(header: &str, regexp: &str) -> Result<Self, BindError> {
        let mut config = Self::default();
        config
            .bind_field("header", header)
            .map_err(|reason| BindError::new("header", reason))?;
        config
            .bind_field("regexp", regexp)
            .map_err(|reason| BindError::new("regexp", reason))?;
        Ok(config)
    }
}

impl BindConfig for HeaderConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "header" => {
                let name = HeaderName::from_bytes(value.trim().as_bytes())
                    .map_err(|e| format!("invalid header name '{}': {}", value, e))?;
                self.header = Some(name);
            }
            "regexp" => self.regexp = Some(compile_full_match(value)?),
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("header", self.header.is_some())?;
        require("regexp", self.regexp.is_some())
    }
}

/// True iff some value of the named header fully matches the regex.
pub struct HeaderRoutePredicateFactory;

impl RoutePredicateFactory for HeaderRoutePredicateFactory {
    type Config = HeaderConfig;

    const NAME: &'static str = "Header";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["header", "regexp"]
    }

    fn apply(&self, config: HeaderConfig) -> Result<Predicate, BindError> {
        match (config.header, config.regexp) {
            (Some(name), Some(regex)) => Ok(Predicate::Header { name, regex }),
            (None, _) => Err(BindError::new("header", "must not be empty")),
            (_, None) => Err(BindError::new("regexp", "must not be empty")),
        }
    }
}

const CF_FORWARDED_URL: &str = "X-CF-Forwarded-Url";
const CF_PROXY_SIGNATURE: &str = "X-CF-Proxy-Signature";
const CF_PROXY_METADATA: &str = "X-CF-Proxy-Metadata";

/// Requires the three Cloud Foundry route-service headers, composed from
/// `Header` predicates.
pub struct CloudFoundryRouteServiceRoutePredicateFactory;

impl RoutePredicateFactory for CloudFoundryRouteServiceRoutePredicateFactory {
    type Config = NoConfig;

    const NAME: &'static str = "CloudFoundryRouteService";

    fn apply(&self, _config: NoConfig) -> Result<Predicate, BindError> {
        let header = HeaderRoutePredicateFactory;
        let forwarded_url = header.apply(HeaderConfig::new(CF_FORWARDED_URL, ".*")?)?;
        let signature = header.apply(HeaderConfig::new(CF_PROXY_SIGNATURE, ".*")?)?;
        let metadata = header.apply(HeaderConfig::new(CF_PROXY_METADATA, ".*")?)?;
        Ok(forwarded_url.and(signature).and(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::definition::Args;
    use crate::routing::predicate::test_support::exchange_for;
    use crate::routing::predicate::PredicateFactory;
    use http::Request;

    #[test]
    fn matches_any_header_value() {
        let predicate = HeaderRoutePredicateFactory
            .build(&Args::positional(["X-Request-Id", "\\d+"]))
            .unwrap();
        let ok = exchange_for(
            Request::builder()
                .uri("/")
                .header("x-request-id", "abc")
                .header("x-request-id", "123"),
        );
        let bad = exchange_for(Request::builder().uri("/").header("x-request-id", "12a"));
        let absent = exchange_for(Request::builder().uri("/"));
        assert!(predicate.test(&ok));
        assert!(!predicate.test(&bad));
        assert!(!predicate.test(&absent));
    }

    #[test]
    fn invalid_header_name_fails_on_field() {
        let err = HeaderRoutePredicateFactory
            .build(&Args::positional(["bad header", ".*"]))
            .unwrap_err();
        assert_eq!(err.field, "header");
    }

    #[test]
    fn cloud_foundry_requires_all_three_headers() {
        let predicate = CloudFoundryRouteServiceRoutePredicateFactory
            .build(&Args::new())
            .unwrap();
        let all = exchange_for(
            Request::builder()
                .uri("/")
                .header(CF_FORWARDED_URL, "https://app.example.com")
                .header(CF_PROXY_SIGNATURE, "sig")
                .header(CF_PROXY_METADATA, "meta"),
        );
        let partial = exchange_for(
            Request::builder()
                .uri("/")
                .header(CF_FORWARDED_URL, "https://app.example.com"),
        );
        assert!(predicate.test(&all));
        assert!(!predicate.test(&partial));
    }

    #[test]
    fn cloud_foundry_rejects_args() {
        assert!(CloudFoundryRouteServiceRoutePredicateFactory
            .build(&Args::positional(["x"]))
            .is_err());
    }
}
