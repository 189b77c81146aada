use crate::proxy::context::ServerExchange;
use http::header::{CONNECTION, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersFilterType {
    Request,
    Response,
}

/// One stage of the header pipeline applied around the proxy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpHeadersFilter {
    RemoveHopByHop,
    XForwarded,
}

impl HttpHeadersFilter {
    /// Pipeline used by the proxy call filter.
    pub const DEFAULT: &'static [HttpHeadersFilter] =
        &[HttpHeadersFilter::RemoveHopByHop, HttpHeadersFilter::XForwarded];

    pub fn supports(&self, ty: HeadersFilterType) -> bool {
        match self {
            HttpHeadersFilter::RemoveHopByHop => true,
            HttpHeadersFilter::XForwarded => ty == HeadersFilterType::Request,
        }
    }

    fn apply(&self, headers: &mut HeaderMap, exchange: &ServerExchange) {
        match self {
            HttpHeadersFilter::RemoveHopByHop => remove_hop_headers(headers),
            HttpHeadersFilter::XForwarded => {
                let host = exchange
                    .request
                    .headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                inject_forwarded_headers(headers, exchange.client_addr(), host);
            }
        }
    }
}

/// Runs `input` through every filter that supports `ty`.
pub fn filter_headers(
    filters: &[HttpHeadersFilter],
    mut input: HeaderMap,
    exchange: &ServerExchange,
    ty: HeadersFilterType,
) -> HeaderMap {
    for filter in filters.iter().filter(|f| f.supports(ty)) {
        filter.apply(&mut input, exchange);
    }
    input
}

pub fn filter_request(filters: &[HttpHeadersFilter], exchange: &ServerExchange) -> HeaderMap {
    filter_headers(
        filters,
        exchange.request.headers.clone(),
        exchange,
        HeadersFilterType::Request,
    )
}

pub fn filter_response(
    filters: &[HttpHeadersFilter],
    headers: HeaderMap,
    exchange: &ServerExchange,
) -> HeaderMap {
    filter_headers(filters, headers, exchange, HeadersFilterType::Response)
}

fn remove_hop_headers(headers: &mut HeaderMap) {
    // Connection may nominate further hop-by-hop headers.
    let nominated: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let hop_headers: &[HeaderName] = &[
        CONNECTION,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-authenticate"),
        HeaderName::from_static("proxy-authorization"),
        HeaderName::from_static("te"),
        HeaderName::from_static("trailer"),
        TRANSFER_ENCODING,
        HeaderName::from_static("upgrade"),
    ];

    for h in hop_headers.iter().chain(nominated.iter()) {
        headers.remove(h);
    }
}

/// `X-Forwarded-For` gets the peer appended, `X-Forwarded-Proto` defaults to
/// `http`, `X-Forwarded-Host` is the original Host, `X-Real-IP` is the peer.
fn inject_forwarded_headers(headers: &mut HeaderMap, peer_addr: SocketAddr, original_host: &str) {
    static XFF: HeaderName = HeaderName::from_static("x-forwarded-for");
    static XFP: HeaderName = HeaderName::from_static("x-forwarded-proto");
    static XFH: HeaderName = HeaderName::from_static("x-forwarded-host");
    static XRI: HeaderName = HeaderName::from_static("x-real-ip");

    let peer_ip = peer_addr.ip().to_string();

    if let Some(existing) = headers.get(&XFF).and_then(|v| v.to_str().ok()) {
        let combined = format!("{}, {}", existing, peer_ip);
        if let Ok(v) = HeaderValue::from_str(&combined) {
            headers.insert(XFF.clone(), v);
        }
    } else if let Ok(v) = HeaderValue::from_str(&peer_ip) {
        headers.insert(XFF.clone(), v);
    }

    if !headers.contains_key(&XFP) {
        headers.insert(XFP.clone(), HeaderValue::from_static("http"));
    }

    if !original_host.is_empty() {
        if let Ok(v) = HeaderValue::from_str(original_host) {
            headers.insert(XFH.clone(), v);
        }
    }

    if let Ok(v) = HeaderValue::from_str(&peer_ip) {
        headers.insert(XRI.clone(), v);
    }
}
