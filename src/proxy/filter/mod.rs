mod forward;
mod headers;
mod load_balancer;
mod request;
mod response;
mod route_to_url;
mod routing;
mod write_response;

pub use forward::{ForwardRoutingFilter, LocalEndpoint};
pub use headers::{HeadersFilterType, HttpHeadersFilter};
pub use request::{
    AddRequestHeaderFilterFactory, AddRequestParameterFilterFactory, PrefixPathFilterFactory,
    PreserveHostHeaderFilterFactory, RemoveRequestHeaderFilterFactory, StripPrefixFilterFactory,
};
pub use response::{
    parse_status, AddResponseHeaderFilterFactory, RemoveResponseHeaderFilterFactory,
    SetStatusFilterFactory,
};
pub use routing::RoutingFilter;
pub use write_response::WriteResponseFilter;

use crate::error::GatewayError;
use crate::proxy::chain::{GatewayFilterChain, OrderedFilter};
use crate::proxy::context::ServerExchange;
use crate::routing::binding::{
    bind, normalize, require, unknown_field, BindConfig, BindError, ShortcutType,
};
use crate::routing::definition::Args;
use crate::routing::registry::FactoryRegistry;
use crate::upstream::{HttpTransport, LoadBalancerClient};
use futures_util::future::BoxFuture;
use http::{HeaderName, HeaderValue, StatusCode};
use std::fmt;
use std::sync::Arc;

pub const FORWARD_PATH_FILTER_ORDER: i32 = 0;
pub const ROUTE_TO_URL_FILTER_ORDER: i32 = 10000;
pub const LOAD_BALANCER_CLIENT_FILTER_ORDER: i32 = 10100;
pub const ROUTING_FILTER_ORDER: i32 = i32::MAX;
pub const WRITE_RESPONSE_FILTER_ORDER: i32 = -1;

/// Extension point for filters defined outside the built-in set.
pub trait GatewayFilter: Send + Sync {
    fn filter<'e>(
        &'e self,
        exchange: &'e mut ServerExchange,
        chain: GatewayFilterChain<'e>,
    ) -> BoxFuture<'e, Result<(), GatewayError>>;

    /// Declared order; `None` lets the route locator assign a positional one.
    fn order(&self) -> Option<i32> {
        None
    }
}

/// Enum-based filter: static dispatch for the built-ins, with `Custom` as the
/// escape hatch for anything else.
///
/// Filters are built once when a route is converted (at load / refresh time),
/// never per request.
pub enum Filter {
    // global routing filters
    RouteToRequestUrl,
    LoadBalancerClient(Arc<dyn LoadBalancerClient>),
    ForwardPath,
    Routing(RoutingFilter),
    ForwardRouting(ForwardRoutingFilter),
    WriteResponse(WriteResponseFilter),

    // route filters
    AddRequestHeader(HeaderName, HeaderValue),
    AddRequestParameter { name: String, value: String },
    RemoveRequestHeader(HeaderName),
    PrefixPath(String),
    StripPrefix(usize),
    PreserveHostHeader,
    AddResponseHeader(HeaderName, HeaderValue),
    RemoveResponseHeader(HeaderName),
    SetStatus(StatusCode),

    Custom(Arc<dyn GatewayFilter>),
}

impl Filter {
    pub fn custom<F: GatewayFilter + 'static>(filter: F) -> Self {
        Filter::Custom(Arc::new(filter))
    }

    /// Order the filter carries on its own, if any.
    pub fn declared_order(&self) -> Option<i32> {
        match self {
            Filter::RouteToRequestUrl => Some(ROUTE_TO_URL_FILTER_ORDER),
            Filter::LoadBalancerClient(_) => Some(LOAD_BALANCER_CLIENT_FILTER_ORDER),
            Filter::ForwardPath => Some(FORWARD_PATH_FILTER_ORDER),
            Filter::Routing(_) | Filter::ForwardRouting(_) => Some(ROUTING_FILTER_ORDER),
            Filter::WriteResponse(_) => Some(WRITE_RESPONSE_FILTER_ORDER),
            Filter::Custom(f) => f.order(),
            _ => None,
        }
    }

    pub fn filter<'e>(
        &'e self,
        exchange: &'e mut ServerExchange,
        chain: GatewayFilterChain<'e>,
    ) -> BoxFuture<'e, Result<(), GatewayError>> {
        Box::pin(async move {
            match self {
                Filter::RouteToRequestUrl => {
                    route_to_url::route_to_request_url(exchange, chain).await
                }
                Filter::LoadBalancerClient(client) => {
                    load_balancer::load_balancer_client(client.as_ref(), exchange, chain).await
                }
                Filter::ForwardPath => forward::forward_path(exchange, chain).await,
                Filter::Routing(f) => f.filter(exchange, chain).await,
                Filter::ForwardRouting(f) => f.filter(exchange, chain).await,
                Filter::WriteResponse(f) => f.filter(exchange, chain).await,
                Filter::AddRequestHeader(name, value) => {
                    request::add_request_header(name, value, exchange, chain).await
                }
                Filter::AddRequestParameter { name, value } => {
                    request::add_request_parameter(name, value, exchange, chain).await
                }
                Filter::RemoveRequestHeader(name) => {
                    request::remove_request_header(name, exchange, chain).await
                }
                Filter::PrefixPath(prefix) => request::prefix_path(prefix, exchange, chain).await,
                Filter::StripPrefix(parts) => request::strip_prefix(*parts, exchange, chain).await,
                Filter::PreserveHostHeader => request::preserve_host_header(exchange, chain).await,
                Filter::AddResponseHeader(name, value) => {
                    response::add_response_header(name, value, exchange, chain).await
                }
                Filter::RemoveResponseHeader(name) => {
                    response::remove_response_header(name, exchange, chain).await
                }
                Filter::SetStatus(status) => response::set_status(*status, exchange, chain).await,
                Filter::Custom(f) => f.filter(exchange, chain).await,
            }
        })
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::RouteToRequestUrl => write!(f, "RouteToRequestUrl"),
            Filter::LoadBalancerClient(_) => write!(f, "LoadBalancerClient"),
            Filter::ForwardPath => write!(f, "ForwardPath"),
            Filter::Routing(_) => write!(f, "Routing"),
            Filter::ForwardRouting(_) => write!(f, "ForwardRouting"),
            Filter::WriteResponse(_) => write!(f, "WriteResponse"),
            Filter::AddRequestHeader(n, v) => write!(f, "AddRequestHeader({}, {:?})", n, v),
            Filter::AddRequestParameter { name, value } => {
                write!(f, "AddRequestParameter({}, {})", name, value)
            }
            Filter::RemoveRequestHeader(n) => write!(f, "RemoveRequestHeader({})", n),
            Filter::PrefixPath(p) => write!(f, "PrefixPath({})", p),
            Filter::StripPrefix(n) => write!(f, "StripPrefix({})", n),
            Filter::PreserveHostHeader => write!(f, "PreserveHostHeader"),
            Filter::AddResponseHeader(n, v) => write!(f, "AddResponseHeader({}, {:?})", n, v),
            Filter::RemoveResponseHeader(n) => write!(f, "RemoveResponseHeader({})", n),
            Filter::SetStatus(s) => write!(f, "SetStatus({})", s.as_u16()),
            Filter::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// The fixed filters every request runs, in registration order. The proxy
/// call filter precedes the forward filter so equal orders keep that order.
pub fn global_filters(
    transport: Arc<dyn HttpTransport>,
    lb_client: Arc<dyn LoadBalancerClient>,
    streaming_media_types: Vec<String>,
    local_endpoints: Vec<LocalEndpoint>,
) -> Vec<OrderedFilter> {
    let filters = vec![
        Filter::WriteResponse(WriteResponseFilter::new(streaming_media_types)),
        Filter::ForwardPath,
        Filter::RouteToRequestUrl,
        Filter::LoadBalancerClient(lb_client),
        Filter::Routing(RoutingFilter::new(transport)),
        Filter::ForwardRouting(ForwardRoutingFilter::new(local_endpoints)),
    ];
    filters
        .into_iter()
        .enumerate()
        .map(|(i, f)| OrderedFilter::with_fallback(f, i as i32 + 1))
        .collect()
}

/// A typed filter factory: binds a `Config` and turns it into a `Filter`.
pub trait GatewayFilterFactory: Send + Sync + 'static {
    type Config: BindConfig;

    const NAME: &'static str;

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &[]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::Default
    }

    fn new_config(&self) -> Self::Config {
        Self::Config::default()
    }

    fn apply(&self, config: Self::Config) -> Result<Filter, BindError>;
}

/// Object-safe view of a filter factory, stored in the registry.
pub trait FilterFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn build(&self, args: &Args) -> Result<Filter, BindError>;
}

impl<F: GatewayFilterFactory> FilterFactory for F {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn build(&self, args: &Args) -> Result<Filter, BindError> {
        let properties = normalize(args, self.shortcut_type(), self.shortcut_field_order())?;
        let config = bind(self.new_config(), &properties)?;
        self.apply(config)
    }
}

pub type FilterRegistry = FactoryRegistry<dyn FilterFactory>;

impl FactoryRegistry<dyn FilterFactory> {
    /// Registry holding every built-in filter factory.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AddRequestHeaderFilterFactory);
        registry.register(AddRequestParameterFilterFactory);
        registry.register(RemoveRequestHeaderFilterFactory);
        registry.register(PrefixPathFilterFactory);
        registry.register(StripPrefixFilterFactory);
        registry.register(PreserveHostHeaderFilterFactory);
        registry.register(AddResponseHeaderFilterFactory);
        registry.register(RemoveResponseHeaderFilterFactory);
        registry.register(SetStatusFilterFactory);
        registry
    }

    pub fn register<G: GatewayFilterFactory>(&mut self, factory: G) {
        self.insert(G::NAME, Arc::new(factory));
    }
}

/// `name` + `value` pair shared by the add-header/parameter factories.
#[derive(Debug, Default)]
pub struct NameValueConfig {
    pub name: Option<String>,
    pub value: Option<String>,
}

impl NameValueConfig {
    pub const FIELDS: &'static [&'static str] = &["name", "value"];

    /// Converts into a header pair, failing on the offending field.
    fn into_header(self) -> Result<(HeaderName, HeaderValue), BindError> {
        let (name, value) = self.into_pair()?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BindError::new("name", format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| BindError::new("value", format!("invalid header value: {}", e)))?;
        Ok((name, value))
    }

    fn into_pair(self) -> Result<(String, String), BindError> {
        match (self.name, self.value) {
            (Some(name), Some(value)) => Ok((name, value)),
            (None, _) => Err(BindError::new("name", "must not be empty")),
            (_, None) => Err(BindError::new("value", "must not be empty")),
        }
    }
}

impl BindConfig for NameValueConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "name" => self.name = Some(value.trim().to_string()),
            "value" => self.value = Some(value.to_string()),
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("name", self.name.as_deref().is_some_and(|n| !n.is_empty()))?;
        require("value", self.value.is_some())
    }
}

/// A single header `name`.
#[derive(Debug, Default)]
pub struct NameConfig {
    pub name: Option<HeaderName>,
}

impl NameConfig {
    fn into_name(self) -> Result<HeaderName, BindError> {
        self.name
            .ok_or_else(|| BindError::new("name", "must not be empty"))
    }
}

impl BindConfig for NameConfig {
    fn bind_field(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "name" => {
                let name = HeaderName::from_bytes(value.trim().as_bytes())
                    .map_err(|e| format!("invalid header name '{}': {}", value, e))?;
                self.name = Some(name);
            }
            _ => return unknown_field(field),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), BindError> {
        require("name", self.name.is_some())
    }
}
