use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Result<Self> {
        let handle = builder()?.install_recorder()?;
        describe_all();
        Ok(Self { handle })
    }

    /// A handle whose recorder is not installed globally. Renders nothing
    /// recorded through the macros; used where no process-wide recorder
    /// should be claimed.
    pub fn detached() -> Result<Self> {
        let recorder = builder()?.build_recorder();
        Ok(Self {
            handle: recorder.handle(),
        })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn builder() -> Result<PrometheusBuilder> {
    Ok(PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Suffix("_duration_seconds".to_string()),
        LATENCY_BUCKETS,
    )?)
}

/// Adds HELP / TYPE lines for every metric the gateway emits.
fn describe_all() {
    // request path
    describe_counter!(
        "gateway_http_requests_total",
        Unit::Count,
        "Total HTTP requests processed"
    );
    describe_histogram!(
        "gateway_http_request_duration_seconds",
        Unit::Seconds,
        "Total request duration from client perspective"
    );
    describe_histogram!(
        "gateway_upstream_request_duration_seconds",
        Unit::Seconds,
        "Upstream request duration (time spent waiting for upstream)"
    );
    describe_gauge!(
        "gateway_http_requests_in_flight",
        Unit::Count,
        "Number of requests currently being processed"
    );

    // connections
    describe_gauge!(
        "gateway_connections_active",
        Unit::Count,
        "Number of active downstream connections"
    );
    describe_counter!(
        "gateway_connections_total",
        Unit::Count,
        "Total connections accepted"
    );

    // route table
    describe_gauge!(
        "gateway_routes_loaded",
        Unit::Count,
        "Number of routes in the current route table"
    );
    describe_counter!(
        "gateway_route_refresh_total",
        Unit::Count,
        "Route table rebuilds"
    );
    describe_counter!(
        "gateway_route_build_errors_total",
        Unit::Count,
        "Route definitions skipped because they failed to build"
    );

    // load balancing
    describe_counter!(
        "gateway_lb_no_instance_total",
        Unit::Count,
        "Requests for which the load balancer had no instance"
    );
}
