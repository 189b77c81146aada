use crate::metrics::Metrics;
use crate::{config, server};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub listen: String,
    pub admin_listen: String,
}

/// Gateway lifecycle: init, warm routes, serve, shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    // Phase 1: config and shared state.
    let gateway = config::GatewayConfig::load(&args.config_path)?;
    let metrics = Metrics::install()?;
    let state = server::GatewayState::new(gateway, metrics)?;

    // Phase 2: build the route table before taking traffic.
    let routes = state.routing.refresh().await;
    tracing::info!("route: initial table ready, routes={}", routes.len());

    // Phase 3: background loops, all owned here.
    let shutdown = Arc::new(Notify::new());
    start_refresh_listener(&state.routing, &shutdown);
    start_reload_signal(&state.routing, &shutdown);
    start_admin_server(&state, &args);

    tracing::info!("server: starting gateway, listen={}", args.listen);

    let proxy_handle = tokio::spawn({
        let listen = args.listen.clone();
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move { server::run_proxy_server(&listen, state, shutdown).await }
    });

    // Phase 4: block until signal, then wait for the proxy to drain.
    wait_for_shutdown(&shutdown).await?;

    match proxy_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("server: proxy failed, error={}", e),
        Err(e) => tracing::error!("server: proxy task error: {}", e),
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

pub fn init_tracing() {
    let (non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    std::mem::forget(_guard);
}

/// Rebuilds the route table each time the refresh signal fires.
pub fn start_refresh_listener(routing: &server::RoutingState, shutdown: &Arc<Notify>) {
    let routing = routing.clone();
    let signal = routing.refresh_signal();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = signal.notified() => {
                    let routes = routing.refresh().await;
                    tracing::debug!("route: refresh signal handled, routes={}", routes.len());
                }
                _ = shutdown.notified() => {
                    tracing::info!("route: refresh listener stopped");
                    return;
                }
            }
        }
    });
}

/// SIGHUP asks for a route rebuild.
fn start_reload_signal(routing: &server::RoutingState, shutdown: &Arc<Notify>) {
    #[cfg(unix)]
    {
        let routing = routing.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut hangup =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("server: SIGHUP handler unavailable, error={}", e);
                        return;
                    }
                };
            loop {
                tokio::select! {
                    Some(()) = hangup.recv() => {
                        tracing::info!("server: received SIGHUP, refreshing routes");
                        routing.request_refresh();
                    }
                    _ = shutdown.notified() => return,
                }
            }
        });
    }

    #[cfg(not(unix))]
    let _ = (routing, shutdown);
}

fn start_admin_server(state: &server::GatewayState, args: &BootstrapArgs) {
    let s = state.clone();
    let admin_addr = args.admin_listen.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_admin_server(&admin_addr, s).await {
            tracing::error!("server: admin failed, error={}", e);
        }
    });
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    // Signal all background loops to stop.
    shutdown.notify_waiters();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::upstream::{HyperTransport, StaticLoadBalancerClient};
    use std::time::Duration;

    #[tokio::test]
    async fn refresh_signal_rebuilds_routes() {
        let config = GatewayConfig::default();
        let state = server::GatewayState::with_components(
            GatewayConfig::default(),
            Metrics::detached().unwrap(),
            Arc::new(HyperTransport::new(&config.http_client)),
            Arc::new(StaticLoadBalancerClient::new()),
        )
        .unwrap();
        let shutdown = Arc::new(Notify::new());
        start_refresh_listener(&state.routing, &shutdown);
        assert!(state.routing.locator.cached().is_none());

        state
            .routing
            .repository
            .save("r1=http://backend,Method=GET".parse().unwrap());
        state.routing.request_refresh();

        let built = async {
            while state.routing.route_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), built)
            .await
            .unwrap();
        assert_eq!(state.routing.route_count(), 1);
        shutdown.notify_waiters();
    }
}
