use crate::api::handlers::{auth, health, GateState};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::h5_login,
        handlers::auth::admin_login,
        handlers::auth::mobile_login,
        handlers::auth::logout,
        handlers::auth::check_status,
        handlers::auth::h5_captcha,
    ),
    components(schemas(
        handlers::health::Health,
        handlers::auth::types::LoginRequest,
        handlers::auth::types::LoginResponse,
        handlers::auth::types::AuthErrorResponse,
        handlers::auth::types::CheckStatusResponse,
        handlers::auth::types::CaptchaResponse,
        crate::envelope::Envelope,
    )),
    tags(
        (name = "auth", description = "Envelope-protected authentication API"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Build the API router with all routes and layers registered.
#[must_use]
pub fn router(state: Arc<GateState>) -> Router {
    Router::new()
        .route("/v1/h5/login", post(auth::h5_login))
        .route("/v1/h5/captcha", get(auth::h5_captcha))
        .route("/v1/admin/login", post(auth::admin_login))
        .route("/v1/admin/check-status", get(auth::check_status))
        .route("/v1/mobile/login", post(auth::mobile_login))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<GateState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
