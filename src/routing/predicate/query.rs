use super::{compile_full_match, Predicate, RoutePredicateFactory};
use crate::routing::binding::{require, unknown_field, BindConfig, BindError};
use regex::Regex;

#[derive(Debug, Default)]
pub struct QueryConfig {
    pub param: String,
    pub regexp: Option<Regex>,
}

impl BindConfig for QueryConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "param" => self.param = value.trim().to_string(),
            "regexp" if value.trim().is_empty() => self.regexp = None,
            "regexp" => self.regexp = Some(compile_full_match(value.trim())?),
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("param", !self.param.is_empty())
    }
}

/// Without a regexp: the parameter is present. With one: some value of the
/// parameter fully matches.
pub struct QueryRoutePredicateFactory;

impl RoutePredicateFactory for QueryRoutePredicateFactory {
    type Config = QueryConfig;

    const NAME: &'static str = "Query";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["param", "regexp"]
    }

    fn apply(&self, config: QueryConfig) -> Result<Predicate, BindError> {
        Ok(Predicate::Query {
            param: config.param,
            regex: config.regexp,
        })
    }
}
