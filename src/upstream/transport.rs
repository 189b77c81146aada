use crate::config::HttpClientConfig;
use crate::error::GatewayError;
use crate::proxy::context::BoxBody;
use futures_util::future::BoxFuture;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An outbound request, already resolved to a concrete URL.
pub struct ProxyRequest {
    pub method: Method,
    pub url: Uri,
    pub headers: HeaderMap,
    /// Send the body with chunked framing.
    pub chunked: bool,
    pub body: BoxBody,
}

/// Outbound HTTP client seam. The response body stays unread.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: ProxyRequest) -> BoxFuture<'_, Result<Response<BoxBody>, GatewayError>>;
}

#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Pooled hyper client speaking HTTP/1.1 and HTTP/2, with optional TLS.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, BoxBody>,
    response_timeout: Option<Duration>,
}

impl HyperTransport {
    pub fn new(config: &HttpClientConfig) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.set_keepalive(Some(config.pool_idle_timeout));
        http.set_connect_timeout(Some(config.connect_timeout));
        http.enforce_http(false);

        let https = if config.tls_verify {
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_webpki_roots()
                .https_or_http()
                .enable_http1()
                .enable_http2()
                .wrap_connector(http)
        } else {
            let tls_config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();

            hyper_rustls::HttpsConnectorBuilder::new()
                .with_tls_config(tls_config)
                .https_or_http()
                .enable_http1()
                .enable_http2()
                .wrap_connector(http)
        };

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(https);

        Self {
            client,
            response_timeout: config.response_timeout,
        }
    }
}

/// Builds the hyper request, switching framing to chunked when asked.
pub fn build_request(request: ProxyRequest) -> Request<BoxBody> {
    let ProxyRequest {
        method,
        url,
        mut headers,
        chunked,
        body,
    } = request;

    if chunked {
        headers.remove(CONTENT_LENGTH);
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    }

    let mut req = Request::new(body);
    *req.method_mut() = method;
    *req.uri_mut() = url;
    *req.headers_mut() = headers;
    req
}

impl HttpTransport for HyperTransport {
    fn send(&self, request: ProxyRequest) -> BoxFuture<'_, Result<Response<BoxBody>, GatewayError>> {
        Box::pin(async move {
            let url = request.url.clone();
            let req = build_request(request);
            let fut = self.client.request(req);
            let result = match self.response_timeout {
                Some(timeout) => tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| GatewayError::UpstreamTimeout)?,
                None => fut.await,
            };
            match result {
                Ok(resp) => Ok(resp.map(|body| body.boxed())),
                Err(e) => {
                    debug!("transport: request failed, url={}, error={}", url, e);
                    if e.is_connect() && is_timeout(&e) {
                        return Err(GatewayError::UpstreamTimeout);
                    }
                    Err(GatewayError::UpstreamConnect(e.to_string()))
                }
            }
        })
    }
}

fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::context::{empty_body, full_body};

    fn request(chunked: bool) -> ProxyRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.insert("x-a", HeaderValue::from_static("1"));
        ProxyRequest {
            method: Method::POST,
            url: "http://10.0.0.1:8080/api".parse().unwrap(),
            headers,
            chunked,
            body: if chunked { empty_body() } else { full_body("hello") },
        }
    }

    #[test]
    fn build_request_keeps_length_framing() {
        let req = build_request(request(false));
        assert_eq!(req.method(), &Method::POST);
        assert_eq!(req.uri().to_string(), "http://10.0.0.1:8080/api");
        assert_eq!(req.headers()[CONTENT_LENGTH], "5");
        assert!(req.headers().get(TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn build_request_switches_to_chunked() {
        let req = build_request(request(true));
        assert!(req.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(req.headers()[TRANSFER_ENCODING], "chunked");
        assert_eq!(req.headers()["x-a"], "1");
    }

    #[tokio::test]
    async fn connect_refused_maps_to_upstream_connect() {
        let config = HttpClientConfig {
            connect_timeout: Duration::from_millis(500),
            ..HttpClientConfig::default()
        };
        let transport = HyperTransport::new(&config);
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut req = request(false);
        req.url = format!("http://{}/", addr).parse().unwrap();
        let err = transport.send(req).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamConnect(_)), "{}", err);
    }
}
