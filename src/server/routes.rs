use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/chat", post(handlers::chat))
        .route("/api/generate", post(handlers::generate))
        .route("/api/embed", post(handlers::embed))
        .route("/api/show", post(handlers::show))
        .route("/api/tags", get(handlers::tags))
        .route("/api/backends", get(handlers::backends))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing::{FakeBackend, FakeFleet};
    use crate::backends::Operation;
    use crate::config::{BackendConfig, BackendSource};
    use crate::registry::Registry;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const X: &str = "http://x:11434";
    const Y: &str = "http://y:11434";

    fn fragments() -> Vec<Value> {
        vec![
            json!({"message": {"role": "assistant", "content": "Hel"}, "done": false}),
            json!({"message": {"role": "assistant", "content": "lo"}, "done": false}),
            json!({"message": {"role": "assistant", "content": ""}, "done": true}),
        ]
    }

    // X serves m1, Y serves m1 and m2
    async fn app(fleet: &FakeFleet) -> Router {
        let source = BackendSource::pinned(vec![
            BackendConfig::from_host("x"),
            BackendConfig::from_host("y"),
        ]);

        let registry = Arc::new(Registry::new(source, fleet.connector()));
        registry.refresh().await;

        router(Arc::new(AppState::new(registry, Duration::from_secs(5))))
    }

    fn fleet() -> FakeFleet {
        let fleet = FakeFleet::new();
        fleet.add(X, FakeBackend::serving("x", &["m1"]).with_fragments(fragments()));
        fleet.add(
            Y,
            FakeBackend::serving("y", &["m1", "m2"]).with_fragments(fragments()),
        );
        fleet
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(res: Response) -> Vec<u8> {
        to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json(res: Response) -> Value {
        serde_json::from_slice(&body_bytes(res).await).unwrap()
    }

    async fn body_lines(res: Response) -> Vec<Value> {
        body_bytes(res)
            .await
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_slice(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_root_reports_liveness() {
        let res = app(&fleet()).await.oneshot(get("/")).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_bytes(res).await, b"Ollama is running");
    }

    #[tokio::test]
    async fn test_streamed_chat_relays_each_fragment() {
        let res = app(&fleet())
            .await
            .oneshot(post_json(
                "/api/chat",
                json!({"model": "m2", "messages": [{"role": "user", "content": "hi"}], "stream": true}),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/x-ndjson");
        assert_eq!(body_lines(res).await, fragments());
    }

    #[tokio::test]
    async fn test_chat_streams_by_default() {
        let res = app(&fleet())
            .await
            .oneshot(post_json("/api/generate", json!({"model": "m2", "prompt": "hi"})))
            .await
            .unwrap();

        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/x-ndjson");
        assert_eq!(body_lines(res).await.len(), 3);
    }

    #[tokio::test]
    async fn test_buffered_chat_forwards_body() {
        let fleet = fleet();
        let res = app(&fleet)
            .await
            .oneshot(post_json(
                "/api/chat",
                json!({"model": "m2", "messages": [], "stream": false, "options": {"temperature": 0}}),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res).await,
            json!({"model": "m2", "backend": "y", "done": true})
        );

        let forwarded = fleet.get(Y).unwrap().forwarded();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].0, Operation::Chat);
        assert_eq!(
            Value::Object(forwarded[0].1.clone()),
            json!({"model": "m2", "messages": [], "stream": false, "options": {"temperature": 0}})
        );
    }

    #[tokio::test]
    async fn test_embed_is_never_streamed() {
        let fleet = fleet();
        let res = app(&fleet)
            .await
            .oneshot(post_json(
                "/api/embed",
                json!({"model": "m2", "input": "hello", "stream": true}),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["done"], true);

        let forwarded = fleet.get(Y).unwrap().forwarded();
        assert_eq!(
            Value::Object(forwarded[0].1.clone()),
            json!({"model": "m2", "input": "hello"})
        );
    }

    #[tokio::test]
    async fn test_show_accepts_name() {
        let fleet = fleet();
        let res = app(&fleet)
            .await
            .oneshot(post_json("/api/show", json!({"name": "m2"})))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);

        let forwarded = fleet.get(Y).unwrap().forwarded();
        assert_eq!(forwarded[0].0, Operation::Show);
        assert_eq!(Value::Object(forwarded[0].1.clone()), json!({"model": "m2"}));
    }

    #[tokio::test]
    async fn test_show_accepts_model_and_name_together() {
        let fleet = fleet();
        let res = app(&fleet)
            .await
            .oneshot(post_json(
                "/api/show",
                json!({"model": "m2", "name": "m1", "verbose": true}),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);

        let forwarded = fleet.get(Y).unwrap().forwarded();
        assert_eq!(
            Value::Object(forwarded[0].1.clone()),
            json!({"model": "m2", "verbose": true})
        );
    }

    #[tokio::test]
    async fn test_show_without_a_model_is_rejected() {
        let fleet = fleet();
        let res = app(&fleet)
            .await
            .oneshot(post_json("/api/show", json!({})))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(fleet.get(X).unwrap().forwarded().is_empty());
        assert!(fleet.get(Y).unwrap().forwarded().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let fleet = fleet();
        let res = app(&fleet)
            .await
            .oneshot(post_json("/api/chat", json!({"model": "ghost", "messages": []})))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(body_json(res).await["error"]
            .as_str()
            .unwrap()
            .contains("\"ghost\""));

        // One pass at startup, one on the miss
        assert_eq!(fleet.get(X).unwrap().listings(), 2);
        assert_eq!(fleet.get(Y).unwrap().listings(), 2);
    }

    #[tokio::test]
    async fn test_missing_model_is_rejected() {
        let res = app(&fleet())
            .await
            .oneshot(post_json("/api/chat", json!({"messages": []})))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_empty_model_is_rejected() {
        let res = app(&fleet())
            .await
            .oneshot(post_json("/api/generate", json!({"model": "", "prompt": "hi"})))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(res).await,
            json!({"error": "model name must not be empty"})
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_bad_gateway() {
        let fleet = fleet();
        let app = app(&fleet).await;
        fleet.get(Y).unwrap().set_unreachable(true);

        let res = app
            .oneshot(post_json("/api/chat", json!({"model": "m2", "stream": false})))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(res).await,
            json!({"error": "backend failed to serve the request"})
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_error_line() {
        let fleet = FakeFleet::new();
        fleet.add(
            X,
            FakeBackend::serving("x", &["m1"])
                .with_fragments(fragments())
                .failing_after(1),
        );
        fleet.add(Y, FakeBackend::serving("y", &[]));

        let res = app(&fleet)
            .await
            .oneshot(post_json("/api/chat", json!({"model": "m1"})))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);

        let lines = body_lines(res).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], fragments()[0]);
        assert_eq!(lines[1], json!({"error": "backend failed mid-stream"}));
    }

    #[tokio::test]
    async fn test_tags_lists_models_with_backends() {
        let fleet = fleet();
        let app = app(&fleet).await;
        fleet.get(X).unwrap().set_models(&["m1", "m3"]);

        let res = app.oneshot(get("/api/tags")).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(res).await;
        let models = body["models"].as_array().unwrap();
        let names: Vec<&str> = models.iter().map(|m| m["name"].as_str().unwrap()).collect();

        assert_eq!(names, vec!["m1", "m2", "m3"]);
        assert_eq!(models[0]["model"], "m1");
        assert_eq!(models[0]["backends"], json!([X, Y]));
        assert_eq!(models[2]["backends"], json!([X]));
    }

    #[tokio::test]
    async fn test_backends_reports_status() {
        let fleet = fleet();
        let app = app(&fleet).await;

        let res = app.oneshot(get("/api/backends")).await.unwrap();

        assert_eq!(
            body_json(res).await,
            json!([
                {"id": X, "address": X, "status": "ok", "models": 1},
                {"id": Y, "address": Y, "status": "ok", "models": 2},
            ])
        );
    }
}
