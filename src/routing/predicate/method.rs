use super::{Predicate, RoutePredicateFactory};
use crate::routing::binding::{require, unknown_field, BindConfig, BindError};
use http::Method;

#[derive(Debug, Default)]
pub struct MethodConfig {
    pub method: Option<Method>,
}

impl BindConfig for MethodConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "method" => {
                let method = Method::from_bytes(value.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|e| format!("invalid method '{}': {}", value, e))?;
                self.method = Some(method);
            }
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("method", self.method.is_some())
    }
}

/// Matches the request method exactly.
pub struct MethodRoutePredicateFactory;

impl RoutePredicateFactory for MethodRoutePredicateFactory {
    type Config = MethodConfig;

    const NAME: &'static str = "Method";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["method"]
    }

    fn apply(&self, config: MethodConfig) -> Result<Predicate, BindError> {
        let method = config
            .method
            .ok_or_else(|| BindError::new("method", "must not be empty"))?;
        Ok(Predicate::Method(method))
    }
}
