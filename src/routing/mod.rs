pub mod binding;
pub mod caching;
pub mod definition;
pub mod locator;
pub mod predicate;
pub mod registry;
pub mod route;
pub mod source;

pub use caching::CachingRouteLocator;
pub use definition::{Args, FilterDefinition, PredicateDefinition, RouteDefinition};
pub use locator::{RouteDefinitionLocator, RouteDefinitionRouteLocator, RouteLocator, Routes};
pub use route::Route;
pub use source::{
    CompositeRouteDefinitionLocator, InMemoryRouteDefinitionRepository,
    PropertiesRouteDefinitionLocator,
};
