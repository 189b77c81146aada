use super::{Filter, GatewayFilterFactory, NameConfig, NameValueConfig};
use crate::error::GatewayError;
use crate::proxy::chain::GatewayFilterChain;
use crate::proxy::context::ServerExchange;
use crate::routing::binding::{parse_value, require, unknown_field, BindConfig, BindError, NoConfig};
use crate::support::uri::with_query;
use http::{HeaderName, HeaderValue};
use tracing::trace;

pub(super) async fn add_request_header(
    name: &HeaderName,
    value: &HeaderValue,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    exchange
        .request
        .headers
        .append(name.clone(), value.clone());
    chain.filter(exchange).await
}

/// Appends `name=value` to the raw query, joining with `&`.
pub(super) async fn add_request_parameter(
    name: &str,
    value: &str,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    let mut query = String::new();
    if let Some(original) = exchange.request.uri.query().filter(|q| !q.is_empty()) {
        query.push_str(original);
        if !original.ends_with('&') {
            query.push('&');
        }
    }
    query.push_str(name);
    query.push('=');
    query.push_str(value);

    exchange.request.uri = with_query(&exchange.request.uri, &query)
        .map_err(|_| GatewayError::InvalidRequest(format!("Invalid URI query: \"{}\"", query)))?;
    chain.filter(exchange).await
}

pub(super) async fn remove_request_header(
    name: &HeaderName,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    exchange.request.headers.remove(name);
    chain.filter(exchange).await
}

/// Prepends `prefix` to the raw path once per exchange.
pub(super) async fn prefix_path(
    prefix: &str,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    if exchange.attributes.is_already_prefixed() {
        return chain.filter(exchange).await;
    }
    exchange.attributes.set_already_prefixed();
    exchange
        .attributes
        .add_original_request_url(exchange.request.uri.clone());

    let path = format!("{}{}", prefix, exchange.request.path());
    exchange.request.set_path(&path)?;
    exchange
        .attributes
        .set_request_url(exchange.request.uri.clone());
    trace!("filter: prefixed path, prefix={}, uri={}", prefix, exchange.request.uri);

    chain.filter(exchange).await
}

/// Drops the first `parts` path segments.
pub(super) async fn strip_prefix(
    parts: usize,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    exchange
        .attributes
        .add_original_request_url(exchange.request.uri.clone());

    let path = exchange.request.path();
    let mut stripped: String = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(parts)
        .flat_map(|segment| ["/", segment])
        .collect();
    if stripped.is_empty() || (path.ends_with('/') && !stripped.ends_with('/')) {
        stripped.push('/');
    }
    exchange.request.set_path(&stripped)?;
    exchange
        .attributes
        .set_request_url(exchange.request.uri.clone());

    chain.filter(exchange).await
}

pub(super) async fn preserve_host_header(
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    exchange.attributes.set_preserve_host_header();
    chain.filter(exchange).await
}

pub struct AddRequestHeaderFilterFactory;

impl GatewayFilterFactory for AddRequestHeaderFilterFactory {
    type Config = NameValueConfig;

    const NAME: &'static str = "AddRequestHeader";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        NameValueConfig::FIELDS
    }

    fn apply(&self, config: NameValueConfig) -> Result<Filter, BindError> {
        let (name, value) = config.into_header()?;
        Ok(Filter::AddRequestHeader(name, value))
    }
}

pub struct AddRequestParameterFilterFactory;

impl GatewayFilterFactory for AddRequestParameterFilterFactory {
    type Config = NameValueConfig;

    const NAME: &'static str = "AddRequestParameter";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        NameValueConfig::FIELDS
    }

    fn apply(&self, config: NameValueConfig) -> Result<Filter, BindError> {
        let (name, value) = config.into_pair()?;
        Ok(Filter::AddRequestParameter { name, value })
    }
}

pub struct RemoveRequestHeaderFilterFactory;

impl GatewayFilterFactory for RemoveRequestHeaderFilterFactory {
    type Config = NameConfig;

    const NAME: &'static str = "RemoveRequestHeader";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn apply(&self, config: NameConfig) -> Result<Filter, BindError> {
        Ok(Filter::RemoveRequestHeader(config.into_name()?))
    }
}

#[derive(Debug, Default)]
pub struct PrefixConfig {
    pub prefix: Option<String>,
}

impl BindConfig for PrefixConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "prefix" => {
                let prefix = value.trim();
                if !prefix.starts_with('/') {
                    return Err(format!("prefix '{}' must start with '/'", prefix));
                }
                self.prefix = Some(prefix.to_string());
            }
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("prefix", self.prefix.is_some())
    }
}

pub struct PrefixPathFilterFactory;

impl GatewayFilterFactory for PrefixPathFilterFactory {
    type Config = PrefixConfig;

    const NAME: &'static str = "PrefixPath";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["prefix"]
    }

    fn apply(&self, config: PrefixConfig) -> Result<Filter, BindError> {
        let prefix = config
            .prefix
            .ok_or_else(|| BindError::new("prefix", "must not be empty"))?;
        Ok(Filter::PrefixPath(prefix))
    }
}

#[derive(Debug, Default)]
pub struct PartsConfig {
    pub parts: usize,
}

impl BindConfig for PartsConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "parts" => self.parts = parse_value(value)?,
            _ => return unknown_field(field),
        }
        Ok(())
    }
}

pub struct StripPrefixFilterFactory;

impl GatewayFilterFactory for StripPrefixFilterFactory {
    type Config = PartsConfig;

    const NAME: &'static str = "StripPrefix";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["parts"]
    }

    fn apply(&self, config: PartsConfig) -> Result<Filter, BindError> {
        Ok(Filter::StripPrefix(config.parts))
    }
}

pub struct PreserveHostHeaderFilterFactory;

impl GatewayFilterFactory for PreserveHostHeaderFilterFactory {
    type Config = NoConfig;

    const NAME: &'static str = "PreserveHostHeader";

    fn apply(&self, _config: NoConfig) -> Result<Filter, BindError> {
        Ok(Filter::PreserveHostHeader)
    }
}
