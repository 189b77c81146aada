use crate::error::{FactoryKind, GatewayError};
use crate::proxy::chain::OrderedFilter;
use crate::proxy::filter::{Filter, FilterRegistry};
use crate::routing::binding::BindError;
use crate::routing::definition::{FilterDefinition, PredicateDefinition, RouteDefinition};
use crate::routing::predicate::{Predicate, PredicateRegistry};
use crate::routing::route::Route;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// A snapshot of the route table, sorted by route order.
pub type Routes = Arc<Vec<Arc<Route>>>;

/// Supplies executable routes.
pub trait RouteLocator: Send + Sync {
    fn get_routes(&self) -> BoxFuture<'_, Routes>;
}

/// Supplies route definitions, in registration order.
pub trait RouteDefinitionLocator: Send + Sync {
    fn get_route_definitions(&self) -> BoxStream<'_, RouteDefinition>;
}

/// Converts definitions into routes through the factory registries.
pub struct RouteDefinitionRouteLocator {
    source: Arc<dyn RouteDefinitionLocator>,
    predicates: Arc<PredicateRegistry>,
    filters: Arc<FilterRegistry>,
    default_filters: Vec<FilterDefinition>,
}

impl RouteDefinitionRouteLocator {
    pub fn new(
        source: Arc<dyn RouteDefinitionLocator>,
        predicates: Arc<PredicateRegistry>,
        filters: Arc<FilterRegistry>,
        default_filters: Vec<FilterDefinition>,
    ) -> Self {
        Self {
            source,
            predicates,
            filters,
            default_filters,
        }
    }

    /// Builds one route. Every failure is scoped to this definition.
    pub fn convert_to_route(&self, definition: &RouteDefinition) -> Result<Route, GatewayError> {
        let predicate = self.combine_predicates(definition)?;
        let filters = self.get_filters(definition)?;
        Ok(Route::new(
            definition.id.clone(),
            definition.order,
            definition.uri.clone(),
            predicate,
            filters,
        ))
    }

    /// ANDs the predicates left to right.
    fn combine_predicates(
        &self,
        definition: &RouteDefinition,
    ) -> Result<Predicate, GatewayError> {
        let mut predicates = definition.predicates.iter();
        let first = predicates.next().ok_or_else(|| {
            GatewayError::InvalidDefinition(format!(
                "route '{}' must declare at least one predicate",
                definition.id
            ))
        })?;
        let mut combined = self.lookup_predicate(&definition.id, first)?;
        for next in predicates {
            combined = combined.and(self.lookup_predicate(&definition.id, next)?);
        }
        Ok(combined)
    }

    fn lookup_predicate(
        &self,
        route_id: &str,
        definition: &PredicateDefinition,
    ) -> Result<Predicate, GatewayError> {
        let factory = self.predicates.get(&definition.name).ok_or_else(|| {
            GatewayError::UnknownFactory {
                route_id: route_id.to_string(),
                kind: FactoryKind::Predicate,
                name: definition.name.clone(),
            }
        })?;
        debug!(
            "route: binding predicate, route={}, name={}",
            route_id, definition.name
        );
        factory
            .build(&definition.args)
            .map_err(|e| binding_error(route_id, &definition.name, e))
    }

    /// Default filters first, then the route's own. Filters without a
    /// declared order take their 1-based position in the merged list.
    fn get_filters(
        &self,
        definition: &RouteDefinition,
    ) -> Result<Vec<OrderedFilter>, GatewayError> {
        let mut filters =
            Vec::with_capacity(self.default_filters.len() + definition.filters.len());
        for (i, filter) in self
            .default_filters
            .iter()
            .chain(definition.filters.iter())
            .enumerate()
        {
            let built = self.load_filter(&definition.id, filter)?;
            filters.push(OrderedFilter::with_fallback(built, i as i32 + 1));
        }
        filters.sort_by_key(|f| f.order());
        Ok(filters)
    }

    fn load_filter(
        &self,
        route_id: &str,
        definition: &FilterDefinition,
    ) -> Result<Filter, GatewayError> {
        let factory =
            self.filters
                .get(&definition.name)
                .ok_or_else(|| GatewayError::UnknownFactory {
                    route_id: route_id.to_string(),
                    kind: FactoryKind::Filter,
                    name: definition.name.clone(),
                })?;
        factory
            .build(&definition.args)
            .map_err(|e| binding_error(route_id, &definition.name, e))
    }

    /// Converts every definition, skipping broken ones, then stable-sorts by
    /// route order.
    pub async fn build_routes(&self) -> Vec<Arc<Route>> {
        let definitions: Vec<RouteDefinition> =
            self.source.get_route_definitions().collect().await;
        let mut routes = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            match self.convert_to_route(definition) {
                Ok(route) => routes.push(Arc::new(route)),
                Err(e) => {
                    warn!(
                        "route: skipped invalid definition, id={}, error={}",
                        definition.id, e
                    );
                    metrics::counter!(
                        "gateway_route_build_errors_total",
                        "route" => definition.id.clone(),
                    )
                    .increment(1);
                }
            }
        }
        routes.sort_by_key(|r| r.order());
        routes
    }
}

impl RouteLocator for RouteDefinitionRouteLocator {
    fn get_routes(&self) -> BoxFuture<'_, Routes> {
        Box::pin(async move { Arc::new(self.build_routes().await) })
    }
}

fn binding_error(route_id: &str, factory: &str, e: BindError) -> GatewayError {
    GatewayError::Binding {
        route_id: route_id.to_string(),
        factory: factory.to_string(),
        field: e.field,
        reason: e.reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::source::PropertiesRouteDefinitionLocator;

    fn locator(definitions: &[&str], default_filters: &[&str]) -> RouteDefinitionRouteLocator {
        let definitions = definitions.iter().map(|d| d.parse().unwrap()).collect();
        RouteDefinitionRouteLocator::new(
            Arc::new(PropertiesRouteDefinitionLocator::new(definitions)),
            Arc::new(PredicateRegistry::with_defaults()),
            Arc::new(FilterRegistry::with_defaults()),
            default_filters.iter().map(|f| f.parse().unwrap()).collect(),
        )
    }

    fn definition(text: &str) -> RouteDefinition {
        text.parse().unwrap()
    }

    #[test]
    fn filters_get_positional_orders_after_defaults() {
        let locator = locator(&[], &["AddRequestHeader=X-Default, d"]);
        let definition = definition("r1=http://backend,Method=GET")
            .with_filter("PrefixPath=/api".parse().unwrap())
            .with_filter("PreserveHostHeader".parse().unwrap());
        let route = locator.convert_to_route(&definition).unwrap();
        let orders: Vec<i32> = route.filters().iter().map(|f| f.order()).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(matches!(
            route.filters()[0].filter(),
            Filter::AddRequestHeader(..)
        ));
    }

    #[test]
    fn unknown_predicate_names_route_and_factory() {
        let locator = locator(&[], &[]);
        let err = locator
            .convert_to_route(&definition("r1=http://backend,Nope=1"))
            .unwrap_err();
        match err {
            GatewayError::UnknownFactory {
                route_id,
                kind,
                name,
            } => {
                assert_eq!(route_id, "r1");
                assert_eq!(kind, FactoryKind::Predicate);
                assert_eq!(name, "Nope");
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn binding_error_names_factory_and_field() {
        let locator = locator(&[], &[]);
        let definition = definition("r1=http://backend,Method=GET")
            .with_filter("StripPrefix=two".parse().unwrap());
        match locator.convert_to_route(&definition).unwrap_err() {
            GatewayError::Binding { factory, field, .. } => {
                assert_eq!(factory, "StripPrefix");
                assert_eq!(field, "parts");
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn route_without_predicates_is_rejected() {
        let locator = locator(&[], &[]);
        let err = locator
            .convert_to_route(&definition("r1=http://backend"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn broken_routes_are_skipped() {
        let locator = locator(
            &[
                "a=http://a,Method=GET",
                "broken=http://b,Nope=1",
                "c=http://c,Method=GET",
            ],
            &[],
        );
        let routes = locator.get_routes().await;
        let ids: Vec<&str> = routes.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn routes_sort_by_order_keeping_ties() {
        let definitions = vec![
            definition("a=http://a,Method=GET").with_order(5),
            definition("b=http://b,Method=GET").with_order(1),
            definition("c=http://c,Method=GET").with_order(5),
        ];
        let locator = RouteDefinitionRouteLocator::new(
            Arc::new(PropertiesRouteDefinitionLocator::new(definitions)),
            Arc::new(PredicateRegistry::with_defaults()),
            Arc::new(FilterRegistry::with_defaults()),
            Vec::new(),
        );
        let routes = locator.get_routes().await;
        let ids: Vec<&str> = routes.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
