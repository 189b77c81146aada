use super::GatewayState;
use crate::proxy::context::{error_response, full_body};
use crate::proxy::BoxBody;
use crate::routing::{RouteDefinition, Routes};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use hyper::{Request, Response};
use tracing::{info, warn};

fn json_response(status: StatusCode, body: String) -> Response<BoxBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn routes_json(routes: &Routes) -> String {
    let routes: Vec<serde_json::Value> = routes
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id(),
                "order": r.order(),
                "uri": r.uri().as_str(),
                "filters": r.filters().iter().map(|f| {
                    serde_json::json!({"filter": format!("{:?}", f.filter()), "order": f.order()})
                }).collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&routes).unwrap_or_default()
}

pub async fn handle_admin<B>(
    req: Request<B>,
    state: GatewayState,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: hyper::body::Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match (&method, path.as_str()) {
        (&Method::GET, "/health" | "/healthz") => {
            json_response(StatusCode::OK, r#"{"status":"ok"}"#.to_string())
        }

        (&Method::GET, "/ready" | "/readyz") => json_response(
            StatusCode::OK,
            format!(
                r#"{{"status":"ready","routes":{}}}"#,
                state.routing.route_count()
            ),
        ),

        (&Method::GET, "/metrics") => {
            let mut resp = Response::new(full_body(state.metrics.render()));
            resp.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            resp
        }

        (&Method::GET, "/routes") => {
            let routes = match state.routing.locator.cached() {
                Some(routes) => routes,
                None => state.routing.refresh().await,
            };
            json_response(StatusCode::OK, routes_json(&routes))
        }

        (&Method::POST, "/routes/refresh") => {
            let routes = state.routing.refresh().await;
            json_response(StatusCode::OK, format!(r#"{{"routes":{}}}"#, routes.len()))
        }

        (&Method::POST, _) if path.starts_with("/routes/") => {
            let id = path["/routes/".len()..].to_string();
            save_route(req, &state, id).await
        }

        (&Method::DELETE, _) if path.starts_with("/routes/") => {
            let id = &path["/routes/".len()..];
            if !state.routing.repository.delete(id) {
                return Ok(error_response(StatusCode::NOT_FOUND, "route not found"));
            }
            let routes = state.routing.refresh().await;
            info!("admin: route deleted, id={}", id);
            json_response(StatusCode::OK, format!(r#"{{"routes":{}}}"#, routes.len()))
        }

        _ => error_response(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(resp)
}

/// Saves the JSON definition under the id from the path, then rebuilds.
async fn save_route<B>(req: Request<B>, state: &GatewayState, id: String) -> Response<BoxBody>
where
    B: hyper::body::Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    if id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "route id must not be empty");
    }
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("admin: failed to read body, error={}", e);
            return error_response(StatusCode::BAD_REQUEST, "bad request");
        }
    };
    let mut definition: RouteDefinition = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid route definition: {}", e),
            )
        }
    };
    if definition.predicates.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "route must declare at least one predicate",
        );
    }
    if state.config.routes.iter().any(|r| r.id == id) {
        return error_response(
            StatusCode::CONFLICT,
            "route id is defined in configuration",
        );
    }
    definition.id = id;

    // nothing is stored unless the definition builds
    if let Err(e) = state.routing.builder.convert_to_route(&definition) {
        warn!("admin: rejected route, id={}, error={}", definition.id, e);
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("route failed to build: {}", e),
        );
    }
    let id = definition.id.clone();
    state.routing.repository.save(definition);
    let routes = state.routing.refresh().await;

    info!("admin: route saved, id={}", id);
    json_response(StatusCode::OK, format!(r#"{{"routes":{}}}"#, routes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::GatewayError;
    use crate::metrics::Metrics;
    use crate::upstream::{HttpTransport, ProxyRequest, StaticLoadBalancerClient};
    use futures_util::future::BoxFuture;
    use http_body_util::Full;
    use std::sync::Arc;

    struct Unreachable;

    impl HttpTransport for Unreachable {
        fn send(
            &self,
            _request: ProxyRequest,
        ) -> BoxFuture<'_, Result<Response<BoxBody>, GatewayError>> {
            Box::pin(async { Err(GatewayError::UpstreamConnect("unreachable".into())) })
        }
    }

    fn state() -> GatewayState {
        let config: GatewayConfig = toml::from_str(
            r#"
[[routes]]
id = "static"
uri = "http://backend"
predicates = ["Path=/static/**"]
"#,
        )
        .unwrap();
        GatewayState::with_components(
            config,
            Metrics::detached().unwrap(),
            Arc::new(Unreachable),
            Arc::new(StaticLoadBalancerClient::new()),
        )
        .unwrap()
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn call(state: &GatewayState, req: Request<Full<Bytes>>) -> (StatusCode, serde_json::Value) {
        let resp = handle_admin(req, state.clone()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_and_ready() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/health", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (_, body) = call(&state, request(Method::GET, "/ready", "")).await;
        assert_eq!(body["routes"], 0);
        state.routing.refresh().await;
        let (_, body) = call(&state, request(Method::GET, "/ready", "")).await;
        assert_eq!(body["routes"], 1);
    }

    #[tokio::test]
    async fn list_routes_builds_on_first_read() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/routes", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "static");
        assert_eq!(body[0]["uri"], "http://backend");
    }

    #[tokio::test]
    async fn save_and_delete_dynamic_route() {
        let state = state();
        let definition = r#"{
            "uri": "http://dynamic",
            "order": -1,
            "predicates": ["Path=/dyn/**"],
            "filters": ["SetStatus=201"]
        }"#;
        let (status, body) = call(&state, request(Method::POST, "/routes/dyn", definition)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["routes"], 2);

        let (_, body) = call(&state, request(Method::GET, "/routes", "")).await;
        assert_eq!(body[0]["id"], "dyn");
        assert_eq!(body[0]["filters"][0]["order"], 1);

        let (status, body) = call(&state, request(Method::DELETE, "/routes/dyn", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["routes"], 1);

        let (status, _) = call(&state, request(Method::DELETE, "/routes/dyn", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_unbuildable_route() {
        let state = state();
        let (status, body) = call(
            &state,
            request(
                Method::POST,
                "/routes/bad",
                r#"{"uri": "http://x", "predicates": ["Nope=1"]}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("failed to build"));

        let (status, _) = call(
            &state,
            request(Method::POST, "/routes/bad", r#"{"uri": "http://x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.routing.repository.list().is_empty());
    }

    #[tokio::test]
    async fn failed_update_keeps_previous_route() {
        let state = state();
        let good = r#"{"uri": "http://dynamic", "predicates": ["Path=/dyn/**"]}"#;
        let (status, _) = call(&state, request(Method::POST, "/routes/dyn", good)).await;
        assert_eq!(status, StatusCode::OK);

        let bad = r#"{"uri": "http://dynamic", "predicates": ["Nope=1"]}"#;
        let (status, _) = call(&state, request(Method::POST, "/routes/dyn", bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let routes = state.routing.refresh().await;
        assert_eq!(routes.len(), 2);
        assert!(routes.iter().any(|r| r.id() == "dyn"));
        assert_eq!(state.routing.repository.list()[0].uri.as_str(), "http://dynamic");
    }

    #[tokio::test]
    async fn config_route_id_cannot_be_shadowed() {
        let state = state();
        let definition = r#"{"uri": "http://other", "predicates": ["Path=/other/**"]}"#;
        let (status, body) = call(&state, request(Method::POST, "/routes/static", definition)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("configuration"));
        assert!(state.routing.repository.list().is_empty());
    }

    #[tokio::test]
    async fn refresh_reports_route_count() {
        let state = state();
        let (status, body) = call(&state, request(Method::POST, "/routes/refresh", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["routes"], 1);
    }
}
