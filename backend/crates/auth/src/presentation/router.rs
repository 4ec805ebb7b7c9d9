//! Auth Router

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::domain::repository::AuthStore;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::require_auth;

/// Create the Auth router for any repository implementation.
///
/// Meant to be nested under `config.auth_path`; the refresh and pending
/// cookie paths are derived from it.
pub fn auth_router<R: AuthStore>(state: AuthAppState<R>) -> Router {
    let protected = Router::new()
        .route("/logout", post(handlers::logout::<R>))
        .route("/check", get(handlers::check::<R>))
        .route("/2fa/generate", post(handlers::two_factor_generate::<R>))
        .route("/2fa/verify", post(handlers::two_factor_verify::<R>))
        .route("/2fa/disable", post(handlers::two_factor_disable::<R>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<R>,
        ));

    Router::new()
        .route("/register", post(handlers::register::<R>))
        .route("/login", post(handlers::login::<R>))
        .route("/refresh", post(handlers::refresh::<R>))
        .route("/2fa/login", post(handlers::two_factor_login::<R>))
        .merge(protected)
        .with_state(state)
}
