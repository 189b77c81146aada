use crate::error::GatewayError;
use crate::proxy::chain::GatewayFilterChain;
use crate::proxy::context::ServerExchange;
use crate::support::uri::{contains_encoded_parts, merge_request_url};
use crate::support::RouteUri;
use tracing::debug;

/// Resolves the selected route's URI against the inbound request into the
/// concrete target URL.
///
/// `outer:inner://...` targets record `outer` as the scheme prefix and
/// resolve against `inner`.
pub(super) async fn route_to_request_url(
    exchange: &mut ServerExchange,
    chain: GatewayFilterChain<'_>,
) -> Result<(), GatewayError> {
    let Some(route) = exchange.attributes.route().cloned() else {
        return chain.filter(exchange).await;
    };

    let encoded = contains_encoded_parts(&exchange.request.uri);
    let nested: RouteUri;
    let mut target = route.uri();
    if target.has_another_scheme() {
        exchange.attributes.set_scheme_prefix(target.scheme());
        nested = target.scheme_specific_part().parse()?;
        target = &nested;
    }

    let url = merge_request_url(&exchange.request.uri, target, encoded)?;
    debug!(
        "filter: resolved request url, route={}, url={}, prefix={:?}",
        route.id(),
        url,
        exchange.attributes.scheme_prefix()
    );
    exchange
        .attributes
        .add_original_request_url(exchange.request.uri.clone());
    exchange.attributes.set_request_url(url);

    chain.filter(exchange).await
}
