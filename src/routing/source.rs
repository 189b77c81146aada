use crate::routing::definition::RouteDefinition;
use crate::routing::locator::RouteDefinitionLocator;
use arc_swap::ArcSwap;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::info;

/// Route definitions fixed by the loaded configuration.
pub struct PropertiesRouteDefinitionLocator {
    routes: Vec<RouteDefinition>,
}

impl PropertiesRouteDefinitionLocator {
    pub fn new(routes: Vec<RouteDefinition>) -> Self {
        Self { routes }
    }
}

impl RouteDefinitionLocator for PropertiesRouteDefinitionLocator {
    fn get_route_definitions(&self) -> BoxStream<'_, RouteDefinition> {
        stream::iter(self.routes.iter().cloned()).boxed()
    }
}

/// Runtime-managed definitions. Saving an existing id replaces it in place;
/// new ids append.
#[derive(Default)]
pub struct InMemoryRouteDefinitionRepository {
    routes: ArcSwap<Vec<RouteDefinition>>,
}

impl InMemoryRouteDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, definition: RouteDefinition) {
        let id = definition.id.clone();
        self.routes.rcu(|current| {
            let mut next = (**current).clone();
            match next.iter_mut().find(|r| r.id == definition.id) {
                Some(existing) => *existing = definition.clone(),
                None => next.push(definition.clone()),
            }
            next
        });
        info!("route: definition saved, id={}", id);
    }

    /// Returns false when no definition had this id.
    pub fn delete(&self, id: &str) -> bool {
        let mut removed = false;
        self.routes.rcu(|current| {
            let mut next = (**current).clone();
            let before = next.len();
            next.retain(|r| r.id != id);
            removed = next.len() != before;
            next
        });
        if removed {
            info!("route: definition deleted, id={}", id);
        }
        removed
    }

    pub fn list(&self) -> Arc<Vec<RouteDefinition>> {
        self.routes.load_full()
    }
}

impl RouteDefinitionLocator for InMemoryRouteDefinitionRepository {
    fn get_route_definitions(&self) -> BoxStream<'_, RouteDefinition> {
        let snapshot = self.routes.load_full();
        stream::iter((*snapshot).clone()).boxed()
    }
}

/// Concatenates its delegates' definitions, delegate by delegate.
pub struct CompositeRouteDefinitionLocator {
    delegates: Vec<Arc<dyn RouteDefinitionLocator>>,
}

impl CompositeRouteDefinitionLocator {
    pub fn new(delegates: Vec<Arc<dyn RouteDefinitionLocator>>) -> Self {
        Self { delegates }
    }
}

impl RouteDefinitionLocator for CompositeRouteDefinitionLocator {
    fn get_route_definitions(&self) -> BoxStream<'_, RouteDefinition> {
        stream::iter(self.delegates.iter())
            .flat_map(|d| d.get_route_definitions())
            .boxed()
    }
}
