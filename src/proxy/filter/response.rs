use super::{Filter, GatewayFilterFactory, NameConfig, NameValueConfig};
use crate::error::GatewayError;
use crate::proxy::chain::GatewayFilterChain;
use crate::proxy::context::ServerExchange;
use crate::routing::binding::{require, unknown_field, BindConfig, BindError};
use http::{HeaderName, HeaderValue, StatusCode};

// Response filters act in the post-phase, after the proxy call has copied
// upstream status and headers onto the exchange.

pub(super) async fn add_response_header(
    name: &HeaderName,
    value: &HeaderValue,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    chain.filter(&mut *exchange).await?;
    exchange
        .response
        .headers
        .append(name.clone(), value.clone());
    Ok(())
}

pub(super) async fn remove_response_header(
    name: &HeaderName,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    chain.filter(&mut *exchange).await?;
    exchange.response.headers.remove(name);
    Ok(())
}

pub(super) async fn set_status(
    status: StatusCode,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    chain.filter(&mut *exchange).await?;
    exchange.response.status = status;
    Ok(())
}

/// Parses a numeric status or a reason name such as `BAD_REQUEST`.
pub fn parse_status(value: &str) -> Result<StatusCode, String> {
    let value = value.trim();
    if let Ok(code) = value.parse::<u16>() {
        return StatusCode::from_u16(code)
            .ok()
            .filter(|s| (100..=599).contains(&s.as_u16()))
            .ok_or_else(|| format!("invalid status code {}", code));
    }
    let wanted = value.to_ascii_uppercase().replace(['-', ' '], "_");
    (100..=599u16)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .find(|status| {
            status.canonical_reason().is_some_and(|reason| {
                reason.to_ascii_uppercase().replace(['-', ' '], "_") == wanted
            })
        })
        .ok_or_else(|| format!("unknown status '{}'", value))
}

pub struct AddResponseHeaderFilterFactory;

impl GatewayFilterFactory for AddResponseHeaderFilterFactory {
    type Config = NameValueConfig;

    const NAME: &'static str = "AddResponseHeader";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        NameValueConfig::FIELDS
    }

    fn apply(&self, config: NameValueConfig) -> Result<Filter, BindError> {
        let (name, value) = config.into_header()?;
        Ok(Filter::AddResponseHeader(name, value))
    }
}

pub struct RemoveResponseHeaderFilterFactory;

impl GatewayFilterFactory for RemoveResponseHeaderFilterFactory {
    type Config = NameConfig;

    const NAME: &'static str = "RemoveResponseHeader";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn apply(&self, config: NameConfig) -> Result<Filter, BindError> {
        Ok(Filter::RemoveResponseHeader(config.into_name()?))
    }
}

#[derive(Debug, Default)]
pub struct StatusConfig {
    pub status: Option<StatusCode>,
}

impl BindConfig for StatusConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "status" => self.status = Some(parse_status(value)?),
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("status", self.status.is_some())
    }
}

pub struct SetStatusFilterFactory;

impl GatewayFilterFactory for SetStatusFilterFactory {
    type Config = StatusConfig;

    const NAME: &'static str = "SetStatus";

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &["status"]
    }

    fn apply(&self, config: StatusConfig) -> Result<Filter, BindError> {
        let status = config
            .status
            .ok_or_else(|| BindError::new("status", "must not be empty"))?;
        Ok(Filter::SetStatus(status))
    }
}
