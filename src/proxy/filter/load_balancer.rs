use crate::error::GatewayError;
use crate::proxy::chain::GatewayFilterChain;
use crate::proxy::context::ServerExchange;
use crate::upstream::LoadBalancerClient;
use tracing::{debug, warn};

const LB_SCHEME: &str = "lb";

/// Replaces an `lb` target with a concrete instance chosen by the client.
///
/// Fires when the resolved URL has the `lb` scheme or the `lb` prefix. With a
/// prefix, the URL's own scheme is the fallback when the instance reports no
/// scheme.
pub(super) async fn load_balancer_client(
    client: &dyn LoadBalancerClient,
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    let Some(url) = exchange.attributes.request_url().cloned() else {
        return chain.filter(exchange).await;
    };
    let prefix = exchange.attributes.scheme_prefix();
    if url.scheme_str() != Some(LB_SCHEME) && prefix != Some(LB_SCHEME) {
        return chain.filter(exchange).await;
    }
    let override_scheme = match prefix {
        Some(_) => url.scheme_str().map(str::to_string),
        None => None,
    };

    exchange.attributes.add_original_request_url(url.clone());

    let service_id = url.host().unwrap_or_default();
    let instance = match client.choose(service_id) {
        Some(instance) => instance.with_override_scheme(override_scheme.as_deref()),
        None => {
            warn!("lb: no instance available, service={}", service_id);
            metrics::counter!(
                "gateway_lb_no_instance_total",
                "service" => service_id.to_string(),
            )
            .increment(1);
            return Err(GatewayError::NoInstance(service_id.to_string()));
        }
    };

    let request_url = client.reconstruct_uri(&instance, &exchange.request.uri)?;
    debug!(
        "lb: instance chosen, service={}, instance={}, url={}",
        service_id,
        instance.authority(),
        request_url
    );
    exchange.attributes.set_request_url(request_url);

    chain.filter(exchange).await
}
