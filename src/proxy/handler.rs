use crate::proxy::chain::{combine, GatewayFilterChain, OrderedFilter};
use crate::proxy::context::{error_response, BoxBody, ServerExchange};
use crate::routing::predicate::WeightCalculator;
use crate::routing::{CachingRouteLocator, Route, RouteLocator, Routes};
use crate::server::GatewayState;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Weight draws are computed against one route table; the snapshot is
/// rebuilt only when the table pointer changes.
struct WeightSnapshot {
    routes: Routes,
    calculator: WeightCalculator,
}

/// Resolves a route for each exchange and runs the combined filter chain.
pub struct GatewayHandler {
    locator: Arc<CachingRouteLocator>,
    global_filters: Vec<OrderedFilter>,
    weights: ArcSwapOption<WeightSnapshot>,
    in_flight: AtomicUsize,
}

impl GatewayHandler {
    pub fn new(locator: Arc<CachingRouteLocator>, global_filters: Vec<OrderedFilter>) -> Self {
        Self {
            locator,
            global_filters,
            weights: ArcSwapOption::empty(),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn locator(&self) -> &Arc<CachingRouteLocator> {
        &self.locator
    }

    /// Routed requests whose chain has not finished or been dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Runs one request to completion. Failures become JSON error responses.
    ///
    /// 1. ROUTE_MATCH: weight draw, then first route whose predicate holds
    /// 2. FILTER: global and route filters merged by order
    /// 3. LOG: metrics and one access line
    pub async fn handle<B>(&self, req: Request<B>, peer_addr: SocketAddr) -> Response<BoxBody>
    where
        B: hyper::body::Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
    {
        let mut exchange = ServerExchange::new(req, peer_addr);
        let mut log = AccessLog::new(&exchange);

        let Some(route) = self.lookup_route(&mut exchange).await else {
            debug!(
                "proxy: no route matched, method={}, uri={}",
                exchange.request.method, exchange.request.uri
            );
            let resp = error_response(StatusCode::NOT_FOUND, "not found");
            log.finish(resp.status());
            return resp;
        };

        log.route = route.id().to_string();
        exchange.attributes.set_route(route.clone());
        let in_flight = InFlight::enter(&self.in_flight, &log.route);

        let filters = combine(&self.global_filters, route.filters());
        let result = GatewayFilterChain::new(&filters)
            .filter(&mut exchange)
            .await;

        log.upstream = exchange
            .attributes
            .request_url()
            .and_then(|url| url.authority())
            .map(|a| a.to_string())
            .unwrap_or_default();
        log.upstream_start = exchange.upstream_start();

        let resp = match result {
            Ok(()) => exchange.into_response(),
            Err(e) => {
                warn!("proxy: request failed, route={}, error={}", log.route, e);
                error_response(e.status_code(), &e.to_string())
            }
        };

        drop(in_flight);
        log.finish(resp.status());
        resp
    }

    /// Draws weight groups, then tests routes in order. The first match wins.
    pub async fn lookup_route(&self, exchange: &mut ServerExchange) -> Option<Arc<Route>> {
        let routes = self.locator.get_routes().await;
        let weights = self.weights_for(&routes);
        if !weights.calculator.is_empty() {
            exchange.attributes.set_weights(weights.calculator.choose());
        }

        for route in routes.iter() {
            exchange.attributes.set_predicate_route_id(route.id());
            if route.predicate().test(exchange) {
                debug!("proxy: route matched, route={}", route.id());
                return Some(route.clone());
            }
        }
        None
    }

    fn weights_for(&self, routes: &Routes) -> Arc<WeightSnapshot> {
        if let Some(snapshot) = self
            .weights
            .load_full()
            .filter(|s| Arc::ptr_eq(&s.routes, routes))
        {
            return snapshot;
        }
        let snapshot = Arc::new(WeightSnapshot {
            routes: routes.clone(),
            calculator: WeightCalculator::new(routes.iter().map(|r| r.as_ref())),
        });
        self.weights.store(Some(snapshot.clone()));
        snapshot
    }
}

/// Hyper service entry point.
pub async fn handle_request<B>(
    req: Request<B>,
    state: GatewayState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: hyper::body::Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    Ok(state.proxy.handle(req, peer_addr).await)
}

/// Holds one slot of the in-flight gauge; released on drop, so a request
/// abandoned by its client still decrements.
struct InFlight<'a> {
    count: &'a AtomicUsize,
    route: String,
}

impl<'a> InFlight<'a> {
    fn enter(count: &'a AtomicUsize, route: &str) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!("gateway_http_requests_in_flight", "route" => route.to_string())
            .increment(1.0);
        Self {
            count,
            route: route.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("gateway_http_requests_in_flight", "route" => self.route.clone())
            .decrement(1.0);
    }
}

/// Request facts captured up front, completed as the exchange progresses.
struct AccessLog {
    client_ip: IpAddr,
    method: String,
    host: String,
    path: String,
    route: String,
    upstream: String,
    start: Instant,
    upstream_start: Option<Instant>,
}

impl AccessLog {
    fn new(exchange: &ServerExchange) -> Self {
        Self {
            client_ip: exchange.client_addr().ip(),
            method: exchange.request.method.as_str().to_owned(),
            host: exchange.request.host().unwrap_or("").to_owned(),
            path: exchange.request.path().to_owned(),
            route: "_no_route".to_owned(),
            upstream: String::new(),
            start: exchange.start(),
            upstream_start: None,
        }
    }

    fn finish(&self, status: StatusCode) {
        let elapsed = self.start.elapsed();
        let status_code = status.as_u16();

        metrics::counter!(
            "gateway_http_requests_total",
            "route" => self.route.clone(),
            "method" => self.method.clone(),
            "status_code" => status.as_str().to_owned(),
            "upstream_addr" => self.upstream.clone(),
        )
        .increment(1);
        metrics::histogram!(
            "gateway_http_request_duration_seconds",
            "route" => self.route.clone(),
            "method" => self.method.clone(),
        )
        .record(elapsed.as_secs_f64());

        let upstream_ms = match self.upstream_start {
            Some(at) => {
                let upstream = at.elapsed();
                metrics::histogram!(
                    "gateway_upstream_request_duration_seconds",
                    "route" => self.route.clone(),
                    "upstream_addr" => self.upstream.clone(),
                )
                .record(upstream.as_secs_f64());
                upstream.as_millis()
            }
            None => 0,
        };

        tracing::info!(
            client_ip = %self.client_ip,
            method = %self.method,
            host = %self.host,
            path = %self.path,
            status = status_code,
            route = %self.route,
            upstream = %self.upstream,
            latency_ms = %elapsed.as_millis(),
            upstream_ms = %upstream_ms,
            "access"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::proxy::context::full_body;
    use crate::proxy::filter::{global_filters, FilterRegistry};
    use crate::routing::predicate::PredicateRegistry;
    use crate::routing::{
        Args, PredicateDefinition, PropertiesRouteDefinitionLocator, RouteDefinition,
        RouteDefinitionRouteLocator,
    };
    use crate::upstream::{HttpTransport, ProxyRequest, StaticLoadBalancerClient};
    use futures_util::future::BoxFuture;
    use http_body_util::{BodyExt, Empty};

    /// Answers every call with the target URL as the body.
    struct Echo;

    impl HttpTransport for Echo {
        fn send(
            &self,
            request: ProxyRequest,
        ) -> BoxFuture<'_, Result<Response<BoxBody>, GatewayError>> {
            Box::pin(async move {
                let mut resp = Response::new(full_body(request.url.to_string()));
                resp.headers_mut()
                    .insert("content-type", "text/plain".parse().unwrap());
                Ok(resp)
            })
        }
    }

    fn handler(definitions: &[&str]) -> GatewayHandler {
        handler_for(definitions.iter().map(|d| d.parse().unwrap()).collect())
    }

    /// Never answers.
    struct Stalled;

    impl HttpTransport for Stalled {
        fn send(
            &self,
            _request: ProxyRequest,
        ) -> BoxFuture<'_, Result<Response<BoxBody>, GatewayError>> {
            Box::pin(std::future::pending())
        }
    }

    fn handler_for(definitions: Vec<RouteDefinition>) -> GatewayHandler {
        handler_with(Arc::new(Echo), definitions)
    }

    fn handler_with(
        transport: Arc<dyn HttpTransport>,
        definitions: Vec<RouteDefinition>,
    ) -> GatewayHandler {
        let locator = RouteDefinitionRouteLocator::new(
            Arc::new(PropertiesRouteDefinitionLocator::new(definitions)),
            Arc::new(PredicateRegistry::with_defaults()),
            Arc::new(FilterRegistry::with_defaults()),
            Vec::new(),
        );
        GatewayHandler::new(
            Arc::new(CachingRouteLocator::new(Arc::new(locator))),
            global_filters(
                transport,
                Arc::new(StaticLoadBalancerClient::new()),
                Vec::new(),
                Vec::new(),
            ),
        )
    }

    fn request(method: &str, uri: &str) -> Request<http_body_util::combinators::BoxBody<Bytes, hyper::Error>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "gw.local")
            .body(Empty::<Bytes>::new().map_err(|never| match never {}).boxed())
            .unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn body_text(resp: Response<BoxBody>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn matched_route_is_proxied() {
        let handler = handler(&["r1=http://backend:8080,Method=GET"]);
        let resp = handler.handle(request("GET", "/users?id=1"), peer()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-length"], "30");
        assert_eq!(body_text(resp).await, "http://backend:8080/users?id=1");
    }

    #[tokio::test]
    async fn unmatched_request_is_not_found() {
        let handler = handler(&["r1=http://backend,Method=GET"]);
        let resp = handler.handle(request("POST", "/users"), peer()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(resp).await, r#"{"error":"not found"}"#);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let handler = handler(&[
            "specific=http://specific,Path=/api/**",
            "fallback=http://fallback,Path=/**",
        ]);
        let resp = handler.handle(request("GET", "/api/x"), peer()).await;
        assert_eq!(body_text(resp).await, "http://specific/api/x");
        let resp = handler.handle(request("GET", "/other"), peer()).await;
        assert_eq!(body_text(resp).await, "http://fallback/other");
    }

    #[tokio::test]
    async fn missing_instance_maps_to_service_unavailable() {
        let handler = handler(&["r1=lb://users,Method=GET"]);
        let resp = handler.handle(request("GET", "/"), peer()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_text(resp).await,
            r#"{"error":"unable to find instance for users"}"#
        );
    }

    #[tokio::test]
    async fn weight_snapshot_follows_the_route_table() {
        let weighted = |id: &str| {
            RouteDefinition::new(id, format!("http://{}", id).parse().unwrap()).with_predicate(
                PredicateDefinition::new("Weight", Args::positional(["g", "1"])),
            )
        };
        let handler = handler_for(vec![weighted("a"), weighted("b")]);
        let mut exchange = ServerExchange::new(request("GET", "/"), peer());
        let route = handler.lookup_route(&mut exchange).await.unwrap();
        assert_eq!(exchange.attributes.weights()["g"], route.id());

        let first = handler.weights.load_full().unwrap();
        let mut again = ServerExchange::new(request("GET", "/"), peer());
        handler.lookup_route(&mut again).await.unwrap();
        assert!(Arc::ptr_eq(&first, &handler.weights.load_full().unwrap()));

        handler.locator().refresh().await;
        let mut after = ServerExchange::new(request("GET", "/"), peer());
        handler.lookup_route(&mut after).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &handler.weights.load_full().unwrap()));
    }

    #[tokio::test]
    async fn dropped_request_releases_in_flight_slot() {
        let stalled = handler_with(
            Arc::new(Stalled),
            vec!["r1=http://backend,Method=GET".parse().unwrap()],
        );
        let mut pending = Box::pin(stalled.handle(request("GET", "/"), peer()));
        tokio::select! {
            _ = &mut pending => panic!("stalled upstream answered"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
        }
        assert_eq!(stalled.in_flight(), 1);

        drop(pending);
        assert_eq!(stalled.in_flight(), 0);

        let answering = handler(&["r1=http://backend,Method=GET"]);
        answering.handle(request("GET", "/"), peer()).await;
        assert_eq!(answering.in_flight(), 0);
    }
}
