use http::StatusCode;
use std::fmt;

/// Which registry a definition name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryKind {
    Predicate,
    Filter,
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryKind::Predicate => write!(f, "RoutePredicateFactory"),
            FactoryKind::Filter => write!(f, "GatewayFilterFactory"),
        }
    }
}

#[derive(Debug)]
pub enum GatewayError {
    /// A definition names a factory that is not registered.
    UnknownFactory {
        route_id: String,
        kind: FactoryKind,
        name: String,
    },
    /// A factory config could not be bound from the definition args.
    Binding {
        route_id: String,
        factory: String,
        field: String,
        reason: String,
    },
    /// Malformed definition text or structurally invalid definition.
    InvalidDefinition(String),
    NoRouteMatch,
    /// The load balancer had no instance for the named service.
    NoInstance(String),
    /// Upstream status code that cannot be mapped onto the downstream response.
    InvalidStatus(u16),
    InvalidRequest(String),
    UpstreamConnect(String),
    UpstreamTimeout,
    Config(String),
    Internal(String),
}

impl GatewayError {
    /// HTTP status used when this error terminates a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoRouteMatch => StatusCode::NOT_FOUND,
            GatewayError::NoInstance(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamConnect(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UnknownFactory { .. }
            | GatewayError::Binding { .. }
            | GatewayError::InvalidDefinition(_)
            | GatewayError::InvalidStatus(_)
            | GatewayError::InvalidRequest(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::UnknownFactory {
                route_id,
                kind,
                name,
            } => write!(
                f,
                "route '{}': unable to find {} with name {}",
                route_id, kind, name
            ),
            GatewayError::Binding {
                route_id,
                factory,
                field,
                reason,
            } => write!(
                f,
                "route '{}': failed to bind {}.{}: {}",
                route_id, factory, field, reason
            ),
            GatewayError::InvalidDefinition(msg) => write!(f, "invalid definition: {}", msg),
            GatewayError::NoRouteMatch => write!(f, "no route matched"),
            GatewayError::NoInstance(service) => {
                write!(f, "unable to find instance for {}", service)
            }
            GatewayError::InvalidStatus(code) => {
                write!(f, "unable to set status code on response: {}", code)
            }
            GatewayError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            GatewayError::UpstreamConnect(msg) => write!(f, "upstream connect error: {}", msg),
            GatewayError::UpstreamTimeout => write!(f, "upstream timeout"),
            GatewayError::Config(msg) => write!(f, "config error: {}", msg),
            GatewayError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}
