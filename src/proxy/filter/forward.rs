use crate::error::GatewayError;
use crate::proxy::chain::GatewayFilterChain;
use crate::proxy::context::{full_body, ServerExchange};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use tracing::debug;

const FORWARD_SCHEME: &str = "forward";

/// Rewrites the request path to the path of a `forward:` route target.
pub(super) async fn forward_path(
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    if let Some(route) = exchange.attributes.route().cloned() {
        if route.uri().scheme() == FORWARD_SCHEME && !exchange.attributes.is_already_routed() {
            exchange.request.set_path(route.uri().path().unwrap_or("/"))?;
        }
    }
    chain.filter(exchange).await
}

/// A response served by the gateway itself for `forward:` targets.
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    pub path: String,
    pub status: StatusCode,
    pub content_type: HeaderValue,
    pub body: Bytes,
}

impl LocalEndpoint {
    pub fn new(
        path: impl Into<String>,
        status: StatusCode,
        content_type: HeaderValue,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            path: path.into(),
            status,
            content_type,
            body: body.into(),
        }
    }
}

/// Dispatches `forward:` URLs to in-process endpoints.
pub struct ForwardRoutingFilter {
    endpoints: Vec<LocalEndpoint>,
}

impl ForwardRoutingFilter {
    pub fn new(endpoints: Vec<LocalEndpoint>) -> Self {
        Self { endpoints }
    }

    pub(super) async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: GatewayFilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let path = exchange
            .attributes
            .request_url()
            .filter(|url| url.scheme_str() == Some(FORWARD_SCHEME))
            .map(|url| url.path().to_string());
        let Some(path) = path.filter(|_| !exchange.attributes.is_already_routed()) else {
            return chain.filter(exchange).await;
        };
        exchange.attributes.set_already_routed();

        match self.endpoints.iter().find(|e| e.path == path) {
            Some(endpoint) => {
                debug!("forward: local endpoint, path={}", path);
                exchange.response.status = endpoint.status;
                exchange
                    .response
                    .headers
                    .insert(CONTENT_TYPE, endpoint.content_type.clone());
                exchange.response.write_body(full_body(endpoint.body.clone()));
            }
            None => {
                debug!("forward: no local endpoint, path={}", path);
                exchange.response.status = StatusCode::NOT_FOUND;
                exchange
                    .response
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                exchange
                    .response
                    .write_body(full_body(r#"{"error":"not found"}"#));
            }
        }

        chain.filter(exchange).await
    }
}
