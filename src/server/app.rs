use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::api_routes;
use crate::websocket::ws_handler;

use super::AppState;

/// Largest publish request body accepted, in bytes
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        // WebSocket endpoint
        .route("/ws", get(ws_handler))
        // Merge API routes
        .merge(api_routes())
        // Add middleware
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.settings.server.cors_origins))
        // Add state
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::{HubConfig, OtelConfig, ServerConfig, Settings, WebSocketConfig};
    use crate::hub::Hub;

    fn app() -> (Router, Hub) {
        let settings = Settings {
            server: ServerConfig::default(),
            hub: HubConfig::default(),
            websocket: WebSocketConfig::default(),
            otel: OtelConfig::default(),
        };
        let (hub, _router) = Hub::spawn(&settings.hub);
        (create_app(AppState::new(settings, hub.clone())), hub)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_event(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/events")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let (app, _hub) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_publish_route_accepts_event() {
        let (app, hub) = app();
        let mut session = hub.register().await.unwrap();

        let response = app
            .oneshot(post_event(r#"{"type":"task_created","payload":{"id":"t1"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["accepted"], true);

        let frame = session.receiver.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(value["type"], "task_created");
        assert_eq!(value["payload"]["id"], "t1");
        assert_eq!(value["timestamp"], body["timestamp"]);
    }

    #[tokio::test]
    async fn test_publish_route_rejects_empty_type() {
        let (app, _hub) = app();
        let response = app.oneshot(post_event(r#"{"type":""}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_reports_not_accepted() {
        let (app, hub) = app();
        hub.shutdown();
        // wait for the router to stop
        assert!(hub.sessions().await.is_err());

        let response = app
            .oneshot(post_event(r#"{"type":"task_deleted"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["accepted"], false);
        assert!(body.get("timestamp").is_none());
    }

    #[tokio::test]
    async fn test_sessions_route_lists_registered_sessions() {
        let (app, hub) = app();
        let session = hub.register().await.unwrap();

        let response = app
            .oneshot(Request::get("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["sessions"][0], session.id.as_str());
    }

    #[tokio::test]
    async fn test_sessions_route_unavailable_after_shutdown() {
        let (app, hub) = app();
        hub.shutdown();

        let response = app
            .oneshot(Request::get("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "HUB_UNAVAILABLE");
    }
}
