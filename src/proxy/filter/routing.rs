use super::headers::{filter_request, filter_response, HttpHeadersFilter};
use crate::error::GatewayError;
use crate::proxy::chain::GatewayFilterChain;
use crate::proxy::context::ServerExchange;
use crate::upstream::{HttpTransport, ProxyRequest};
use http::header::{HOST, TRANSFER_ENCODING};
use std::sync::Arc;
use tracing::debug;

/// The proxy call: sends the request upstream and parks the response for
/// the write filter, so every lower-order post-phase still sees status and
/// headers before anything is committed.
pub struct RoutingFilter {
    transport: Arc<dyn HttpTransport>,
    headers_filters: Vec<HttpHeadersFilter>,
}

impl RoutingFilter {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_headers_filters(transport, HttpHeadersFilter::DEFAULT.to_vec())
    }

    pub fn with_headers_filters(
        transport: Arc<dyn HttpTransport>,
        headers_filters: Vec<HttpHeadersFilter>,
    ) -> Self {
        Self {
            transport,
            headers_filters,
        }
    }

    pub(super) async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: GatewayFilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let url = exchange
            .attributes
            .request_url()
            .filter(|url| matches!(url.scheme_str(), Some("http") | Some("https")))
            .cloned();
        let Some(url) = url.filter(|_| !exchange.attributes.is_already_routed()) else {
            return chain.filter(exchange).await;
        };
        exchange.attributes.set_already_routed();

        let chunked = exchange
            .request
            .headers
            .get(TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));

        let mut headers = filter_request(&self.headers_filters, exchange);
        if exchange.attributes.preserve_host_header() {
            if let Some(host) = exchange.request.headers.get(HOST) {
                headers.insert(HOST, host.clone());
            }
        } else {
            headers.remove(HOST);
        }

        let request = ProxyRequest {
            method: exchange.request.method.clone(),
            url,
            headers,
            chunked,
            body: exchange.request.take_body(),
        };
        debug!(
            "proxy: sending upstream, method={}, url={}, chunked={}",
            request.method, request.url, chunked
        );
        exchange.mark_upstream_start();
        let response = self.transport.send(request).await?;

        let (mut parts, body) = response.into_parts();
        let status = parts.status;
        if !(100..=599).contains(&status.as_u16()) {
            return Err(GatewayError::InvalidStatus(status.as_u16()));
        }

        let upstream_headers = std::mem::take(&mut parts.headers);
        let filtered = filter_response(&self.headers_filters, upstream_headers, exchange);
        let response_headers = &mut exchange.response.headers;
        for name in filtered.keys() {
            response_headers.remove(name);
        }
        for (name, value) in filtered.iter() {
            response_headers.append(name.clone(), value.clone());
        }
        exchange.response.status = status;
        exchange
            .attributes
            .set_client_response(http::Response::from_parts(parts, body));

        chain.filter(exchange).await
    }
}
