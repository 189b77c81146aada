use crate::proxy::chain::OrderedFilter;
use crate::routing::predicate::Predicate;
use crate::support::RouteUri;
use std::fmt;

/// An executable route: matcher plus its priority-sorted filters.
pub struct Route {
    id: String,
    order: i32,
    uri: RouteUri,
    predicate: Predicate,
    filters: Vec<OrderedFilter>,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        order: i32,
        uri: RouteUri,
        predicate: Predicate,
        filters: Vec<OrderedFilter>,
    ) -> Self {
        Self {
            id: id.into(),
            order,
            uri,
            predicate,
            filters,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn uri(&self) -> &RouteUri {
        &self.uri
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn filters(&self) -> &[OrderedFilter] {
        &self.filters
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("uri", &self.uri.as_str())
            .field("predicate", &self.predicate)
            .field("filters", &self.filters)
            .finish()
    }
}
