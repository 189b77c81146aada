use crate::config::{GatewayConfig, LocalEndpointConfig};
use crate::metrics::Metrics;
use crate::proxy::filter::{global_filters, FilterRegistry, LocalEndpoint};
use crate::proxy::GatewayHandler;
use crate::routing::predicate::PredicateRegistry;
use crate::routing::{
    CachingRouteLocator, CompositeRouteDefinitionLocator, InMemoryRouteDefinitionRepository,
    PropertiesRouteDefinitionLocator, RouteDefinitionLocator, RouteDefinitionRouteLocator, Routes,
};
use crate::upstream::{HttpTransport, HyperTransport, LoadBalancerClient, StaticLoadBalancerClient};
use anyhow::Result;
use http::{HeaderValue, StatusCode};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Routing domain: the cached route table, the locator that builds it, the
/// runtime definition repository and the refresh signal.
#[derive(Clone)]
pub struct RoutingState {
    pub locator: Arc<CachingRouteLocator>,
    pub builder: Arc<RouteDefinitionRouteLocator>,
    pub repository: Arc<InMemoryRouteDefinitionRepository>,
    refresh: Arc<Notify>,
}

impl RoutingState {
    /// Routes in the current table; zero before the first build.
    pub fn route_count(&self) -> usize {
        self.locator.cached().map(|routes| routes.len()).unwrap_or(0)
    }

    /// Rebuilds the table now and returns it.
    pub async fn refresh(&self) -> Routes {
        self.locator.refresh().await
    }

    /// Asks the refresh listener to rebuild in the background.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn refresh_signal(&self) -> Arc<Notify> {
        self.refresh.clone()
    }
}

/// Shared gateway state, cheaply cloneable.
///
/// Composed of domain-specific sub-states. Pass the narrowest sub-state
/// to each subsystem to avoid leaking unrelated dependencies.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub metrics: Metrics,
    pub routing: RoutingState,
    pub proxy: Arc<GatewayHandler>,
}

impl GatewayState {
    /// Builds the state with the hyper transport and the static service
    /// registry from `config`.
    pub fn new(config: GatewayConfig, metrics: Metrics) -> Result<Self> {
        let transport = Arc::new(HyperTransport::new(&config.http_client));
        let lb_client = Arc::new(StaticLoadBalancerClient::from_config(&config.services));
        Self::with_components(config, metrics, transport, lb_client)
    }

    pub fn with_components(
        config: GatewayConfig,
        metrics: Metrics,
        transport: Arc<dyn HttpTransport>,
        lb_client: Arc<dyn LoadBalancerClient>,
    ) -> Result<Self> {
        let repository = Arc::new(InMemoryRouteDefinitionRepository::new());
        let properties: Arc<dyn RouteDefinitionLocator> =
            Arc::new(PropertiesRouteDefinitionLocator::new(config.routes.clone()));
        let dynamic: Arc<dyn RouteDefinitionLocator> = repository.clone();
        let definitions = Arc::new(CompositeRouteDefinitionLocator::new(vec![
            properties, dynamic,
        ]));

        let builder = Arc::new(RouteDefinitionRouteLocator::new(
            definitions,
            Arc::new(PredicateRegistry::with_defaults()),
            Arc::new(FilterRegistry::with_defaults()),
            config.default_filters.clone(),
        ));
        let locator = Arc::new(CachingRouteLocator::new(builder.clone()));

        let endpoints = config
            .local_endpoints
            .iter()
            .map(local_endpoint)
            .collect::<Result<Vec<_>>>()?;
        let filters = global_filters(
            transport,
            lb_client,
            config.streaming_media_types.clone(),
            endpoints,
        );
        let proxy = Arc::new(GatewayHandler::new(locator.clone(), filters));

        info!(
            "state: prepared, static_routes={}, default_filters={}, services={}",
            config.routes.len(),
            config.default_filters.len(),
            config.services.len()
        );

        Ok(Self {
            config: Arc::new(config),
            metrics,
            routing: RoutingState {
                locator,
                builder,
                repository,
                refresh: Arc::new(Notify::new()),
            },
            proxy,
        })
    }
}

fn local_endpoint(config: &LocalEndpointConfig) -> Result<LocalEndpoint> {
    let status = StatusCode::from_u16(config.status)?;
    let content_type = HeaderValue::from_str(&config.content_type)?;
    Ok(LocalEndpoint::new(
        config.path.clone(),
        status,
        content_type,
        config.body.clone(),
    ))
}
