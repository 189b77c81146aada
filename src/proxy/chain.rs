use crate::error::GatewayError;
use crate::proxy::context::ServerExchange;
use crate::proxy::filter::Filter;
use futures_util::future::BoxFuture;
use std::fmt;

/// A filter with its resolved priority. Lower orders run their pre-phase
/// first and their post-phase last.
pub struct OrderedFilter {
    order: i32,
    filter: Filter,
}

impl OrderedFilter {
    pub fn new(order: i32, filter: Filter) -> Self {
        Self { order, filter }
    }

    /// Wraps `filter` with its declared order, or `position` when it has none.
    pub fn with_fallback(filter: Filter, position: i32) -> Self {
        let order = filter.declared_order().unwrap_or(position);
        Self { order, filter }
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl fmt::Debug for OrderedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.filter, self.order)
    }
}

/// Index-based onion chain over a borrowed, already sorted filter list.
///
/// Invoking the chain at index `i` runs filter `i` with the chain at `i + 1`.
/// Code a filter runs before awaiting the next link is its pre-phase; code
/// after is its post-phase. A filter that never invokes the next link
/// short-circuits everything below it.
#[derive(Clone, Copy)]
pub struct GatewayFilterChain<'a> {
    filters: &'a [&'a OrderedFilter],
    index: usize,
}

impl<'a> GatewayFilterChain<'a> {
    pub fn new(filters: &'a [&'a OrderedFilter]) -> Self {
        Self { filters, index: 0 }
    }

    /// Runs the rest of the chain. Past the last filter this completes
    /// immediately.
    pub fn filter<'e>(
        self,
        exchange: &'e mut ServerExchange,
    ) -> BoxFuture<'e, Result<(), GatewayError>>
    where
        'a: 'e,
    {
        match self.filters.get(self.index) {
            Some(current) => {
                let next = GatewayFilterChain {
                    filters: self.filters,
                    index: self.index + 1,
                };
                current.filter.filter(exchange, next)
            }
            None => Box::pin(async { Ok(()) }),
        }
    }
}

/// Merges global and route filters, globals first, then stable-sorts by
/// order so equal orders keep their relative position.
pub fn combine<'a>(
    global: &'a [OrderedFilter],
    route: &'a [OrderedFilter],
) -> Vec<&'a OrderedFilter> {
    let mut combined: Vec<&OrderedFilter> = Vec::with_capacity(global.len() + route.len());
    combined.extend(global.iter());
    combined.extend(route.iter());
    combined.sort_by_key(|f| f.order);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::filter::GatewayFilter;
    use crate::routing::predicate::test_support::get;
    use std::sync::{Arc, Mutex};

    /// Records its pre and post phases into a shared log.
    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        proceed: bool,
    }

    impl GatewayFilter for Trace {
        fn filter<'e>(
            &'e self,
            exchange: &'e mut ServerExchange,
            chain: GatewayFilterChain<'e>,
        ) -> BoxFuture<'e, Result<(), GatewayError>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("pre{}", self.name));
                if !self.proceed {
                    return Ok(());
                }
                chain.filter(exchange).await?;
                tokio::task::yield_now().await;
                self.log.lock().unwrap().push(format!("post{}", self.name));
                Ok(())
            })
        }
    }

    fn trace(
        order: i32,
        name: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
        proceed: bool,
    ) -> OrderedFilter {
        OrderedFilter::new(
            order,
            Filter::Custom(Arc::new(Trace {
                name,
                log: log.clone(),
                proceed,
            })),
        )
    }

    fn tagged(order: i32, name: &'static str) -> OrderedFilter {
        trace(order, name, &Arc::new(Mutex::new(Vec::new())), true)
    }

    #[tokio::test]
    async fn pre_ascending_post_descending() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let route = vec![
            trace(3, "3", &log, true),
            trace(1, "1", &log, true),
            trace(2, "2", &log, true),
        ];
        let filters = combine(&[], &route);
        let mut exchange = get("/");
        GatewayFilterChain::new(&filters)
            .filter(&mut exchange)
            .await
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["pre1", "pre2", "pre3", "post3", "post2", "post1"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_filters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let route = vec![
            trace(1, "1", &log, true),
            trace(2, "2", &log, false),
            trace(3, "3", &log, true),
        ];
        let filters = combine(&[], &route);
        let mut exchange = get("/");
        GatewayFilterChain::new(&filters)
            .filter(&mut exchange)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["pre1", "pre2", "post1"]);
    }

    #[tokio::test]
    async fn empty_chain_completes() {
        let mut exchange = get("/");
        GatewayFilterChain::new(&[]).filter(&mut exchange).await.unwrap();
    }

    #[test]
    fn merge_is_stable_with_globals_first() {
        let global = vec![tagged(5, "g0"), tagged(5, "g1")];
        let route = vec![tagged(5, "r0"), tagged(1, "r1")];
        let merged = combine(&global, &route);
        let orders: Vec<i32> = merged.iter().map(|f| f.order()).collect();
        assert_eq!(orders, vec![1, 5, 5, 5]);

        assert!(std::ptr::eq(merged[0], &route[1]));
        assert!(std::ptr::eq(merged[1], &global[0]));
        assert!(std::ptr::eq(merged[2], &global[1]));
        assert!(std::ptr::eq(merged[3], &route[0]));
    }

    #[test]
    fn fallback_order_applies_only_without_declared_order() {
        let positional = OrderedFilter::with_fallback(Filter::PreserveHostHeader, 3);
        assert_eq!(positional.order(), 3);
        let declared = OrderedFilter::with_fallback(Filter::RouteToRequestUrl, 3);
        assert_eq!(declared.order(), 10000);
    }
}
