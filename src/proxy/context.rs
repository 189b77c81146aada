use crate::error::GatewayError;
use crate::routing::Route;
use crate::support::uri::with_path;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HOST};
use http::{Extensions, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use http_body_util::{BodyExt, Full};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// JSON error body used for every terminal failure.
pub fn error_response(status: StatusCode, msg: &str) -> Response<BoxBody> {
    let mut resp = Response::new(full_body(format!(
        r#"{{"error":"{}"}}"#,
        msg.replace('\\', "\\\\").replace('"', "\\\"")
    )));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Pending upstream response, parked by the proxy call filter until the
/// write filter commits it.
pub type ClientResponse = Response<BoxBody>;

pub struct ExchangeRequest {
    pub method: Method,
    /// Always absolute (`scheme://authority/path?query`).
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    body: Option<BoxBody>,
}

impl ExchangeRequest {
    /// Takes the body stream; later calls yield an empty body.
    pub fn take_body(&mut self) -> BoxBody {
        self.body.take().unwrap_or_else(empty_body)
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn set_path(&mut self, path: &str) -> Result<(), GatewayError> {
        self.uri = with_path(&self.uri, path)?;
        Ok(())
    }

    /// Host header value, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// Every value of cookie `name` across all `Cookie` headers.
    pub fn cookies<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(move |pair| {
                let (k, v) = pair.trim().split_once('=')?;
                (k.trim() == name).then(|| v.trim())
            })
    }

    /// Every raw value of query parameter `param`.
    pub fn query_values<'a>(&'a self, param: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.uri
            .query()
            .unwrap_or("")
            .split('&')
            .filter_map(move |pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (!k.is_empty() && k == param).then_some(v)
            })
    }
}

pub struct ExchangeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Option<BoxBody>,
}

impl ExchangeResponse {
    /// True once a body has been written.
    pub fn is_committed(&self) -> bool {
        self.body.is_some()
    }

    pub fn write_body(&mut self, body: BoxBody) {
        self.body = Some(body);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Gateway-owned per-request state. Routing-stage flags are set-only.
#[derive(Default)]
pub struct GatewayAttributes {
    route: Option<Arc<Route>>,
    request_url: Option<Uri>,
    scheme_prefix: Option<String>,
    already_routed: bool,
    already_prefixed: bool,
    original_request_urls: Vec<Uri>,
    client_response: Option<ClientResponse>,
    weights: HashMap<String, String>,
    predicate_route_id: Option<String>,
    preserve_host_header: bool,
    extensions: Extensions,
}

impl GatewayAttributes {
    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn set_route(&mut self, route: Arc<Route>) {
        self.route = Some(route);
    }

    pub fn request_url(&self) -> Option<&Uri> {
        self.request_url.as_ref()
    }

    pub fn set_request_url(&mut self, url: Uri) {
        self.request_url = Some(url);
    }

    pub fn scheme_prefix(&self) -> Option<&str> {
        self.scheme_prefix.as_deref()
    }

    pub fn set_scheme_prefix(&mut self, prefix: impl Into<String>) {
        self.scheme_prefix = Some(prefix.into());
    }

    pub fn is_already_routed(&self) -> bool {
        self.already_routed
    }

    pub fn set_already_routed(&mut self) {
        self.already_routed = true;
    }

    pub fn is_already_prefixed(&self) -> bool {
        self.already_prefixed
    }

    pub fn set_already_prefixed(&mut self) {
        self.already_prefixed = true;
    }

    /// Appends `url` unless it is already recorded.
    pub fn add_original_request_url(&mut self, url: Uri) {
        if !self.original_request_urls.contains(&url) {
            self.original_request_urls.push(url);
        }
    }

    pub fn original_request_urls(&self) -> &[Uri] {
        &self.original_request_urls
    }

    pub fn set_client_response(&mut self, response: ClientResponse) {
        self.client_response = Some(response);
    }

    pub fn has_client_response(&self) -> bool {
        self.client_response.is_some()
    }

    /// Takes the pending upstream response; a second call yields `None`.
    pub fn take_client_response(&mut self) -> Option<ClientResponse> {
        self.client_response.take()
    }

    pub fn weights(&self) -> &HashMap<String, String> {
        &self.weights
    }

    pub fn set_weights(&mut self, weights: HashMap<String, String>) {
        self.weights = weights;
    }

    pub fn predicate_route_id(&self) -> Option<&str> {
        self.predicate_route_id.as_deref()
    }

    pub fn set_predicate_route_id(&mut self, id: &str) {
        match &mut self.predicate_route_id {
            Some(current) => {
                current.clear();
                current.push_str(id);
            }
            None => self.predicate_route_id = Some(id.to_string()),
        }
    }

    pub fn preserve_host_header(&self) -> bool {
        self.preserve_host_header
    }

    pub fn set_preserve_host_header(&mut self) {
        self.preserve_host_header = true;
    }

    /// Type-keyed entries for collaborators outside the gateway core.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// The per-request exchange threaded through the filter chain.
pub struct ServerExchange {
    pub request: ExchangeRequest,
    pub response: ExchangeResponse,
    pub attributes: GatewayAttributes,
    client_addr: SocketAddr,
    start: Instant,
    upstream_start: Option<Instant>,
}

impl ServerExchange {
    pub fn new<B>(req: Request<B>, client_addr: SocketAddr) -> Self
    where
        B: hyper::body::Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
    {
        let (parts, body) = req.into_parts();
        let uri = absolute_uri(parts.uri, &parts.headers);
        Self {
            request: ExchangeRequest {
                method: parts.method,
                uri,
                version: parts.version,
                headers: parts.headers,
                body: Some(body.boxed()),
            },
            response: ExchangeResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: None,
            },
            attributes: GatewayAttributes::default(),
            client_addr,
            start: Instant::now(),
            upstream_start: None,
        }
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn upstream_start(&self) -> Option<Instant> {
        self.upstream_start
    }

    pub fn mark_upstream_start(&mut self) {
        self.upstream_start = Some(Instant::now());
    }

    /// Materializes the downstream response from the response half.
    pub fn into_response(self) -> Response<BoxBody> {
        let ExchangeResponse {
            status,
            headers,
            body,
        } = self.response;
        let mut resp = Response::new(body.unwrap_or_else(empty_body));
        *resp.status_mut() = status;
        *resp.headers_mut() = headers;
        resp
    }
}

/// Server requests arrive in origin form; rebuild the absolute URI from the
/// Host header so route URIs can be overlaid onto it.
fn absolute_uri(uri: Uri, headers: &HeaderMap) -> Uri {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri;
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    let pq = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://{}{}", host, pq).parse().unwrap_or(uri)
}
