use crate::routing::locator::{RouteLocator, Routes};
use crate::routing::route::Route;
use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::info;

/// Single-entry memo over a delegate locator.
///
/// Readers always see either the previous complete table or the new one;
/// a refresh builds off to the side and swaps the pointer.
pub struct CachingRouteLocator {
    delegate: Arc<dyn RouteLocator>,
    cache: ArcSwapOption<Vec<Arc<Route>>>,
    build_lock: Mutex<()>,
}

impl CachingRouteLocator {
    pub fn new(delegate: Arc<dyn RouteLocator>) -> Self {
        Self {
            delegate,
            cache: ArcSwapOption::empty(),
            build_lock: Mutex::new(()),
        }
    }

    /// The memoized table, if one has been built.
    pub fn cached(&self) -> Option<Routes> {
        self.cache.load_full()
    }

    /// Rebuilds from the delegate and installs the result.
    pub async fn refresh(&self) -> Routes {
        let _guard = self.build_lock.lock().await;
        self.rebuild().await
    }

    async fn rebuild(&self) -> Routes {
        let start = Instant::now();
        let mut sorted = self.delegate.get_routes().await.to_vec();
        sorted.sort_by_key(|route| route.order());
        let routes: Routes = Arc::new(sorted);
        self.cache.store(Some(routes.clone()));

        metrics::counter!("gateway_route_refresh_total").increment(1);
        metrics::gauge!("gateway_routes_loaded").set(routes.len() as f64);
        info!(
            "route: table refreshed, routes={}, elapsed_ms={}",
            routes.len(),
            start.elapsed().as_millis()
        );
        routes
    }
}

impl RouteLocator for CachingRouteLocator {
    fn get_routes(&self) -> BoxFuture<'_, Routes> {
        Box::pin(async move {
            if let Some(routes) = self.cache.load_full() {
                return routes;
            }
            let _guard = self.build_lock.lock().await;
            // another task may have built it while we waited
            if let Some(routes) = self.cache.load_full() {
                return routes;
            }
            self.rebuild().await
        })
    }
}
