use super::handlers::{healthz_handler, landing_handler, private_handler, readyz_handler};
use crate::{
    auth::{
        callback_handler, login_handler, logout_handler, logout_sso_handler, require_auth,
        session_middleware,
    },
    AppState,
};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::services::ServeDir;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Pages that need a logged-in user; anonymous visitors are sent to login
    let protected = Router::new()
        .route("/private", get(private_handler))
        .route_layer(middleware::from_fn(require_auth));

    Router::new()
        .route("/", get(landing_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        // POST for form submission, GET for plain links
        .route("/auth/logout", get(logout_handler).post(logout_handler))
        .route("/auth/logout/sso", get(logout_sso_handler))
        .merge(protected)
        .nest_service("/static", ServeDir::new("static"))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .with_state(state)
}
