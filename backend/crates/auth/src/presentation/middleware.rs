//! Auth Middleware
//!
//! Middleware for requiring authentication (and optionally a role) on
//! protected routes.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use platform::cookie::extract_cookie;

use crate::application::CheckSessionUseCase;
use crate::application::check_session::CurrentIdentity;
use crate::application::config::ACCESS_COOKIE_NAME;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::user_role::UserRole;
use crate::error::AuthError;
use crate::presentation::handlers::AuthAppState;

/// Middleware that requires a valid access token.
///
/// The identity behind the token must still exist; its current role is
/// attached to the request as [`CurrentIdentity`].
pub async fn require_auth<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_cookie(req.headers(), ACCESS_COOKIE_NAME);

    let identity = CheckSessionUseCase::new(state.repo.clone(), state.tokens.clone())
        .execute(token.as_deref())
        .await?;

    req.extensions_mut()
        .insert(CurrentIdentity::from(&identity));

    Ok(next.run(req).await)
}

/// Role gate, layered inside [`require_auth`]:
///
/// ```ignore
/// router
///     .route_layer(from_fn_with_state(UserRole::Admin, require_role))
///     .route_layer(from_fn_with_state(auth_state, require_auth::<R>))
/// ```
pub async fn require_role(
    State(required): State<UserRole>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let current = req
        .extensions()
        .get::<CurrentIdentity>()
        .copied()
        .ok_or(AuthError::Unauthenticated)?;

    if current.role != required {
        tracing::warn!(
            user_id = %current.user_id,
            role = %current.role,
            required = %required,
            "Role check failed"
        );
        return Err(AuthError::Forbidden);
    }

    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentIdentity>()
            .copied()
            .ok_or(AuthError::Unauthenticated)
    }
}
