use axum::{Router, http, middleware};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::adapters::{
    self,
    http::{app_state::AppState, middleware::preflight_no_content},
};

pub fn create_app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(app_state.config.cors_origin.clone())
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .merge(adapters::http::routes::router())
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .layer(SetResponseHeaderLayer::if_not_present(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http-request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    request_id = %request_id
                )
            }),
        )
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Method, StatusCode};
    use axum_test::TestServer;

    use super::*;
    use crate::test_utils::TestAppStateBuilder;

    #[tokio::test]
    async fn preflight_returns_204_with_cors_headers() {
        let (app_state, _) = TestAppStateBuilder::new().build();
        let server = TestServer::new(create_app(app_state)).unwrap();

        let response = server
            .method(Method::OPTIONS, "/orders")
            .add_header("Origin", "http://localhost:3000")
            .add_header("Access-Control-Request-Method", "POST")
            .await;

        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(
            response.header("access-control-allow-origin"),
            HeaderValue::from_static("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let (app_state, _) = TestAppStateBuilder::new().build();
        let server = TestServer::new(create_app(app_state)).unwrap();

        let response = server.get("/health").await;

        response.assert_status_ok();
        assert_eq!(response.header("x-content-type-options"), "nosniff");
        assert_eq!(response.header("x-frame-options"), "DENY");
    }
}
