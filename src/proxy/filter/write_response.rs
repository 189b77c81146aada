use crate::error::GatewayError;
use crate::proxy::chain::GatewayFilterChain;
use crate::proxy::context::{full_body, ServerExchange};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::HeaderValue;
use http_body_util::BodyExt;
use tracing::{debug, warn};

/// Commits the parked upstream body once every other post-phase has run.
///
/// Streaming media types are passed through frame by frame; everything else
/// is collected and written in one piece with an exact `Content-Length`.
pub struct WriteResponseFilter {
    streaming_media_types: Vec<String>,
}

impl WriteResponseFilter {
    pub fn new(streaming_media_types: Vec<String>) -> Self {
        Self {
            streaming_media_types: streaming_media_types
                .into_iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// True when `content_type` (parameters ignored) matches a configured
    /// streaming type. `type/*` entries match any subtype.
    pub fn is_streaming_media_type(&self, content_type: Option<&str>) -> bool {
        let Some(content_type) = content_type else {
            return false;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        self.streaming_media_types.iter().any(|t| match t.strip_suffix("/*") {
            Some(main) => essence
                .split_once('/')
                .is_some_and(|(m, _)| m == main),
            None => *t == essence,
        })
    }

    pub(super) async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: GatewayFilterChain<'_>,
    ) -> Result<(), GatewayError> {
        chain.filter(&mut *exchange).await?;

        let Some(client_response) = exchange.attributes.take_client_response() else {
            return Ok(());
        };
        let body = client_response.into_body();

        if self.is_streaming_media_type(exchange.response.content_type()) {
            debug!("write: streaming response body");
            exchange.response.write_body(body);
            return Ok(());
        }

        let bytes = body
            .collect()
            .await
            .map_err(|e| {
                warn!("write: failed to read upstream body, error={}", e);
                GatewayError::UpstreamConnect(e.to_string())
            })?
            .to_bytes();
        let headers = &mut exchange.response.headers;
        headers.remove(TRANSFER_ENCODING);
        let mut buf = itoa::Buffer::new();
        if let Ok(len) = HeaderValue::from_str(buf.format(bytes.len())) {
            headers.insert(CONTENT_LENGTH, len);
        }
        exchange.response.write_body(full_body(bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::chain::OrderedFilter;
    use crate::proxy::filter::Filter;
    use crate::routing::predicate::test_support::get;
    use http::header::CONTENT_TYPE;
    use http::Response;

    fn filter() -> WriteResponseFilter {
        WriteResponseFilter::new(vec![
            "text/event-stream".into(),
            "application/stream+json".into(),
            "video/*".into(),
        ])
    }

    #[test]
    fn streaming_match_ignores_parameters_and_case() {
        let f = filter();
        assert!(f.is_streaming_media_type(Some("text/event-stream")));
        assert!(f.is_streaming_media_type(Some("Text/Event-Stream; charset=utf-8")));
        assert!(f.is_streaming_media_type(Some("video/mp4")));
        assert!(!f.is_streaming_media_type(Some("application/json")));
        assert!(!f.is_streaming_media_type(None));
    }

    async fn write(content_type: &str) -> http::Response<crate::proxy::context::BoxBody> {
        let mut exchange = get("/");
        exchange
            .response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        exchange
            .response
            .headers
            .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        exchange
            .attributes
            .set_client_response(Response::new(full_body("hello")));
        let write = OrderedFilter::new(-1, Filter::WriteResponse(filter()));
        let filters = [&write];
        GatewayFilterChain::new(&filters)
            .filter(&mut exchange)
            .await
            .unwrap();
        assert!(!exchange.attributes.has_client_response());
        exchange.into_response()
    }

    #[tokio::test]
    async fn buffered_write_sets_content_length() {
        let resp = write("application/json").await;
        assert_eq!(resp.headers()[CONTENT_LENGTH], "5");
        assert!(resp.headers().get(TRANSFER_ENCODING).is_none());
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn streaming_write_passes_body_through() {
        let resp = write("text/event-stream").await;
        assert!(resp.headers().get(CONTENT_LENGTH).is_none());
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn without_client_response_writes_nothing() {
        let mut exchange = get("/");
        let write = OrderedFilter::new(-1, Filter::WriteResponse(filter()));
        let filters = [&write];
        GatewayFilterChain::new(&filters)
            .filter(&mut exchange)
            .await
            .unwrap();
        assert!(!exchange.response.is_committed());
    }
}
