use super::{compile_full_match, Predicate, RoutePredicateFactory};
use crate::routing::binding::{require, unknown_field, BindConfig, BindError};
use regex::Regex;

#[derive(Debug, Default)]
pub struct CookieConfig {
    pub name: String,
    pub regexp: Option<Regex>,
}

impl BindConfig for CookieConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "name" => self.name = value.trim().to_string(),
            "regexp" => self.regexp = Some(compile_full_match(value)?),
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("name", !self.name.is_empty())?;
        require("regexp", self.regexp.is_some())
    }
}

/// True iff some value of the named cookie fully matches the regex.
pub struct CookieRoutePredicateFactory;

impl RoutePredicateFactory for CookieRoutePredicateFactory {
    type Config = CookieConfig;

    const NAME: &'static str = "Cookie";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["name", "regexp"]
    }

    fn apply(&self, config: CookieConfig) -> Result<Predicate, BindError> {
        let regex = config
            .regexp
            .ok_or_else(|| BindError::new("regexp", "must not be empty"))?;
        Ok(Predicate::Cookie {
            name: config.name,
            regex,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::definition::Args;
    use crate::routing::predicate::test_support::exchange_for;
    use crate::routing::predicate::PredicateFactory;
    use http::Request;

    fn with_cookie(cookie: &str) -> crate::proxy::context::ServerExchange {
        exchange_for(Request::builder().uri("/").header("cookie", cookie))
    }

    #[test]
    fn matches_cookie_value_fully() {
        let predicate = CookieRoutePredicateFactory
            .build(&Args::positional(["chocolate", "ch.p"]))
            .unwrap();
        assert!(predicate.test(&with_cookie("chocolate=chip")));
        assert!(!predicate.test(&with_cookie("chocolate=chips")));
        assert!(!predicate.test(&with_cookie("vanilla=chip")));
    }

    #[test]
    fn single_token_shortcut_is_split() {
        let predicate = CookieRoutePredicateFactory
            .build(&Args::positional(["session, [a-z]+"]))
            .unwrap();
        assert!(predicate.test(&with_cookie("other=1; session=abc")));
    }

    #[test]
    fn missing_regexp_fails() {
        let args: Args = [("name", "session")].into_iter().collect();
        let err = CookieRoutePredicateFactory.build(&args).unwrap_err();
        assert_eq!(err.field, "regexp");
    }

    #[test]
    fn invalid_regexp_fails_on_field() {
        let err = CookieRoutePredicateFactory
            .build(&Args::positional(["c", "("]))
            .unwrap_err();
        assert_eq!(err.field, "regexp");
    }
}
