mod cookie;
mod datetime;
mod header;
mod method;
mod pattern;
mod query;
mod weight;

pub use cookie::{CookieConfig, CookieRoutePredicateFactory};
pub use datetime::{
    parse_datetime, AfterRoutePredicateFactory, BeforeRoutePredicateFactory,
    BetweenConfig, BetweenRoutePredicateFactory, DateTimeConfig,
};
pub use header::{
    CloudFoundryRouteServiceRoutePredicateFactory, HeaderConfig, HeaderRoutePredicateFactory,
};
pub use method::{MethodConfig, MethodRoutePredicateFactory};
pub use pattern::{
    HostRoutePredicateFactory, PathRoutePredicateFactory, PatternConfig, PatternSet,
};
pub use query::{QueryConfig, QueryRoutePredicateFactory};
pub use weight::{WeightCalculator, WeightConfig, WeightRoutePredicateFactory};

use crate::proxy::context::ServerExchange;
use crate::routing::binding::{bind, normalize, BindConfig, BindError, ShortcutType};
use crate::routing::definition::Args;
use crate::routing::registry::FactoryRegistry;
use chrono::{DateTime, Utc};
use http::{HeaderName, Method};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// A compiled route matcher. Evaluation is synchronous and side-effect free.
#[derive(Clone)]
pub enum Predicate {
    Before(DateTime<Utc>),
    After(DateTime<Utc>),
    Between(DateTime<Utc>, DateTime<Utc>),
    Method(Method),
    Cookie { name: String, regex: Regex },
    Header { name: HeaderName, regex: Regex },
    Host(Arc<PatternSet>),
    Path(Arc<PatternSet>),
    Query { param: String, regex: Option<Regex> },
    Weight { group: String, weight: u32 },
    /// Left then right; the right side is skipped when the left is false.
    And(Box<Predicate>, Box<Predicate>),
    Custom(Arc<dyn Fn(&ServerExchange) -> bool + Send + Sync>),
}

impl Predicate {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ServerExchange) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(Arc::new(f))
    }

    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn test(&self, exchange: &ServerExchange) -> bool {
        match self {
            Predicate::Before(at) => Utc::now() < *at,
            Predicate::After(at) => Utc::now() > *at,
            Predicate::Between(start, end) => {
                let now = Utc::now();
                *start < now && now < *end
            }
            Predicate::Method(method) => exchange.request.method == *method,
            Predicate::Cookie { name, regex } => {
                exchange.request.cookies(name).any(|v| regex.is_match(v))
            }
            Predicate::Header { name, regex } => exchange
                .request
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(|v| regex.is_match(v)),
            Predicate::Host(patterns) => exchange
                .request
                .host()
                .map(strip_port)
                .is_some_and(|host| patterns.is_match(host)),
            Predicate::Path(patterns) => patterns.is_match(exchange.request.path()),
            Predicate::Query { param, regex } => match regex {
                Some(regex) => exchange
                    .request
                    .query_values(param)
                    .any(|v| regex.is_match(v)),
                None => exchange.request.query_values(param).next().is_some(),
            },
            Predicate::Weight { group, .. } => {
                let chosen = exchange.attributes.weights().get(group);
                match (chosen, exchange.attributes.predicate_route_id()) {
                    (Some(chosen), Some(route_id)) => chosen == route_id,
                    _ => false,
                }
            }
            Predicate::And(left, right) => left.test(exchange) && right.test(exchange),
            Predicate::Custom(f) => f(exchange),
        }
    }

    /// Every `(group, weight)` declared in this predicate tree.
    pub fn weights(&self) -> Vec<(&str, u32)> {
        let mut out = Vec::new();
        self.collect_weights(&mut out);
        out
    }

    fn collect_weights<'a>(&'a self, out: &mut Vec<(&'a str, u32)>) {
        match self {
            Predicate::Weight { group, weight } => out.push((group.as_str(), *weight)),
            Predicate::And(left, right) => {
                left.collect_weights(out);
                right.collect_weights(out);
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Before(at) => write!(f, "Before({})", at),
            Predicate::After(at) => write!(f, "After({})", at),
            Predicate::Between(a, b) => write!(f, "Between({}, {})", a, b),
            Predicate::Method(m) => write!(f, "Method({})", m),
            Predicate::Cookie { name, regex } => write!(f, "Cookie({}, {})", name, regex),
            Predicate::Header { name, regex } => write!(f, "Header({}, {})", name, regex),
            Predicate::Host(p) => write!(f, "Host({:?})", p.patterns()),
            Predicate::Path(p) => write!(f, "Path({:?})", p.patterns()),
            Predicate::Query { param, regex } => match regex {
                Some(r) => write!(f, "Query({}, {})", param, r),
                None => write!(f, "Query({})", param),
            },
            Predicate::Weight { group, weight } => write!(f, "Weight({}, {})", group, weight),
            Predicate::And(l, r) => write!(f, "({:?} && {:?})", l, r),
            Predicate::Custom(_) => write!(f, "Custom"),
        }
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return host.split_once(']').map(|(h, _)| &host[..h.len() + 1]).unwrap_or(host);
    }
    host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
}

/// Compiles `pattern` so that it must match the whole input.
pub(crate) fn compile_full_match(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| format!("invalid regex: {}", e))
}

/// A typed predicate factory: binds a `Config` and turns it into a `Predicate`.
pub trait RoutePredicateFactory: Send + Sync + 'static {
    type Config: BindConfig;

    const NAME: &'static str;

    fn shortcut_field_order(&self) -> &'static [&'static str] {
        &[]
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::Default
    }

    fn new_config(&self) -> Self::Config {
        Self::Config::default()
    }

    fn apply(&self, config: Self::Config) -> Result<Predicate, BindError>;
}

/// Object-safe view of a predicate factory, stored in the registry.
pub trait PredicateFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn build(&self, args: &Args) -> Result<Predicate, BindError>;
}

impl<F: RoutePredicateFactory> PredicateFactory for F {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn build(&self, args: &Args) -> Result<Predicate, BindError> {
        let properties = normalize(args, self.shortcut_type(), self.shortcut_field_order())?;
        let config = bind(self.new_config(), &properties)?;
        self.apply(config)
    }
}

pub type PredicateRegistry = FactoryRegistry<dyn PredicateFactory>;

impl FactoryRegistry<dyn PredicateFactory> {
    /// Registry holding every built-in predicate factory.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AfterRoutePredicateFactory);
        registry.register(BeforeRoutePredicateFactory);
        registry.register(BetweenRoutePredicateFactory);
        registry.register(CookieRoutePredicateFactory);
        registry.register(HeaderRoutePredicateFactory);
        registry.register(CloudFoundryRouteServiceRoutePredicateFactory);
        registry.register(HostRoutePredicateFactory);
        registry.register(MethodRoutePredicateFactory);
        registry.register(PathRoutePredicateFactory);
        registry.register(QueryRoutePredicateFactory);
        registry.register(WeightRoutePredicateFactory);
        registry
    }

    pub fn register<P: RoutePredicateFactory>(&mut self, factory: P) {
        self.insert(P::NAME, Arc::new(factory));
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::get;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn and_short_circuits_on_false_left() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let predicate = Predicate::custom(|_| false).and(Predicate::custom(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        }));
        assert!(!predicate.test(&get("/")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn and_evaluates_right_when_left_true() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let predicate = Predicate::custom(|_| true).and(Predicate::custom(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            false
        }));
        assert!(!predicate.test(&get("/")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weights_are_collected_through_and() {
        let predicate = Predicate::Method(Method::GET)
            .and(Predicate::Weight {
                group: "g".into(),
                weight: 8,
            })
            .and(Predicate::Weight {
                group: "h".into(),
                weight: 2,
            });
        assert_eq!(predicate.weights(), vec![("g", 8), ("h", 2)]);
    }

    #[test]
    fn strip_port_handles_ipv6() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }

    #[test]
    fn full_match_is_anchored() {
        let re = compile_full_match("ch.p").unwrap();
        assert!(re.is_match("chip"));
        assert!(!re.is_match("chips"));
    }

    #[test]
    fn default_registry_knows_builtins() {
        let registry = PredicateRegistry::with_defaults();
        for name in [
            "After",
            "Before",
            "Between",
            "Cookie",
            "Header",
            "CloudFoundryRouteService",
            "Host",
            "Method",
            "Path",
            "Query",
            "Weight",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(registry.get("Nope").is_none());
    }
}
