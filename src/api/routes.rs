use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::auth::middleware::{optional_auth, require_auth};
use crate::AppState;

/// Request bodies above this size are refused outright.
const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Builds the `/api` subtree.
pub fn create_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        // Public routes (no auth required)
        .route("/auth/register", post(crate::api::handlers::auth::register))
        .route("/auth/login", post(crate::api::handlers::auth::login))
        .route(
            "/auth/verify-otp",
            post(crate::api::handlers::auth::verify_otp),
        )
        .route(
            "/auth/resend-otp",
            post(crate::api::handlers::auth::resend_otp),
        )
        .route(
            "/auth/verify-email/{token}",
            get(crate::api::handlers::auth::verify_email),
        )
        .route("/auth/refresh", post(crate::api::handlers::auth::refresh))
        .route(
            "/auth/forgot-password",
            post(crate::api::handlers::auth::forgot_password),
        )
        .route(
            "/auth/reset-password/{token}",
            post(crate::api::handlers::auth::reset_password),
        );

    // Logout resolves the caller when it can but never turns anyone away, so
    // a browser with expired cookies can still clear them.
    let logout_routes = Router::new()
        .route("/auth/logout", post(crate::api::handlers::auth::logout))
        .layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    let protected_routes = Router::new()
        // Protected routes (auth required)
        .route(
            "/auth/profile",
            get(crate::api::handlers::profile::get_profile),
        )
        .route(
            "/profile",
            get(crate::api::handlers::profile::get_profile)
                .put(crate::api::handlers::profile::update_profile),
        )
        .layer(middleware::from_fn_with_state(state, require_auth));

    public_routes.merge(logout_routes).merge(protected_routes)
}

/// Builds the complete application: `/health`, the `/api` subtree, the
/// middleware stack, and (behind the `swagger-ui` feature) the interactive
/// API documentation.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.server.cors_origin.as_deref());

    let router = Router::new()
        .route("/health", get(crate::api::handlers::health::health))
        .nest("/api", create_router(state.clone()));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", crate::api::ApiDoc::openapi()),
        )
    };

    // Applied innermost-first: requests pass Trace -> CORS -> body limits.
    router
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// With a configured origin the layer answers credentialed requests, which
/// rules out wildcards; without one it stays wide open for local tooling.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.and_then(|o| o.parse::<HeaderValue>().ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    }
}
