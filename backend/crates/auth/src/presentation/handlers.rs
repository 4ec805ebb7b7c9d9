//! HTTP Handlers

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse, Response};
use std::sync::Arc;

use platform::clock::{Clock, SystemClock};
use platform::cookie::extract_cookie;

use crate::application::config::{
    AuthConfig, PENDING_COOKIE_NAME, REFRESH_COOKIE_NAME,
};
use crate::application::{
    CurrentIdentity, LoginInput, LoginOutcome, LoginUseCase, LogoutUseCase, RefreshUseCase,
    RegisterInput, RegisterUseCase, Session, TokenIssuer, TwoFactorUseCase,
};
use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    LoginRequest, MessageResponse, RegisterRequest, TwoFactorDisableRequest,
    TwoFactorGenerateResponse, TwoFactorLoginRequest, TwoFactorVerifyRequest, UserEnvelope,
    UserResponse,
};

/// Shared state for auth handlers and middleware
pub struct AuthAppState<R: AuthStore> {
    pub repo: Arc<R>,
    pub config: Arc<AuthConfig>,
    pub tokens: Arc<TokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

// Manual impl: a derive would demand `R: Clone`
impl<R: AuthStore> Clone for AuthAppState<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            config: self.config.clone(),
            tokens: self.tokens.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<R: AuthStore> AuthAppState<R> {
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>, clock: Arc<dyn Clock>) -> Self {
        let tokens = Arc::new(TokenIssuer::new(&config, clock.clone()));
        Self {
            repo,
            config,
            tokens,
            clock,
        }
    }

    pub fn with_system_clock(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self::new(repo, config, Arc::new(SystemClock))
    }

    fn login_use_case(&self) -> LoginUseCase<R> {
        LoginUseCase::new(
            self.repo.clone(),
            self.config.clone(),
            self.tokens.clone(),
            self.clock.clone(),
        )
    }

    fn two_factor_use_case(&self) -> TwoFactorUseCase<R> {
        TwoFactorUseCase::new(self.repo.clone(), self.config.clone(), self.clock.clone())
    }
}

type Cookies = AppendHeaders<Vec<(HeaderName, String)>>;

// ============================================================================
// Register
// ============================================================================

/// POST /api/auth/register
pub async fn register<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, Json<UserResponse>)> {
    let use_case = RegisterUseCase::new(
        state.repo.clone(),
        state.config.clone(),
        state.clock.clone(),
    );

    let identity = use_case
        .execute(RegisterInput {
            username: req.username,
            email: req.email,
            password: req.password,
            role: req.role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&identity))))
}

// ============================================================================
// Login
// ============================================================================

/// POST /api/auth/login
pub async fn login<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Response> {
    let outcome = state
        .login_use_case()
        .execute(LoginInput {
            email: req.email,
            password: req.password,
            totp_code: req.totp_code,
        })
        .await?;

    match outcome {
        LoginOutcome::Authenticated(session) => Ok(session_response(&state.config, &session)),
        LoginOutcome::TwoFactorRequired { pending_token } => {
            let cookie = state
                .config
                .pending_cookie()
                .build_set_cookie(&pending_token.token);
            Ok((
                AppendHeaders(vec![(header::SET_COOKIE, cookie)]),
                AuthError::TwoFactorRequired,
            )
                .into_response())
        }
    }
}

/// POST /api/auth/2fa/login
pub async fn two_factor_login<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
    Json(req): Json<TwoFactorLoginRequest>,
) -> AuthResult<Response> {
    let pending = extract_cookie(&headers, PENDING_COOKIE_NAME);

    let session = state
        .login_use_case()
        .complete_two_factor(&req.email, &req.token, pending.as_deref())
        .await?;

    Ok(session_response(&state.config, &session))
}

// ============================================================================
// Refresh / Logout / Check
// ============================================================================

/// POST /api/auth/refresh
pub async fn refresh<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
) -> Response {
    let token = extract_cookie(&headers, REFRESH_COOKIE_NAME);
    let use_case = RefreshUseCase::new(state.repo.clone(), state.tokens.clone());

    match use_case.execute(token.as_deref()).await {
        Ok((_, access_token)) => {
            let cookie = state
                .config
                .access_cookie()
                .build_set_cookie(&access_token.token);
            (
                AppendHeaders(vec![(header::SET_COOKIE, cookie)]),
                Json(MessageResponse::new("Token refreshed successfully")),
            )
                .into_response()
        }
        // A dead refresh token is removed from the client
        Err(e @ (AuthError::RefreshTokenExpired | AuthError::RefreshTokenInvalid)) => {
            let cookie = state.config.refresh_cookie().build_delete_cookie();
            (AppendHeaders(vec![(header::SET_COOKIE, cookie)]), e).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// POST /api/auth/logout
pub async fn logout<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    current: CurrentIdentity,
) -> AuthResult<(Cookies, Json<MessageResponse>)> {
    LogoutUseCase::new(state.repo.clone())
        .execute(&current.user_id)
        .await?;

    Ok((
        clear_all_cookies(&state.config),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// GET /api/auth/check
pub async fn check<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    current: CurrentIdentity,
) -> AuthResult<Json<UserEnvelope>> {
    let identity = state
        .repo
        .find_by_id(&current.user_id)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    Ok(Json(UserEnvelope::from(&identity)))
}

// ============================================================================
// Two-Factor enrollment (requires authentication)
// ============================================================================

/// POST /api/auth/2fa/generate
pub async fn two_factor_generate<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    current: CurrentIdentity,
) -> AuthResult<Json<TwoFactorGenerateResponse>> {
    let provisioning = state
        .two_factor_use_case()
        .generate(&current.user_id)
        .await?;

    Ok(Json(provisioning.into()))
}

/// POST /api/auth/2fa/verify
pub async fn two_factor_verify<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    current: CurrentIdentity,
    Json(req): Json<TwoFactorVerifyRequest>,
) -> AuthResult<Json<MessageResponse>> {
    state
        .two_factor_use_case()
        .verify(&current.user_id, &req.secret, &req.token)
        .await?;

    Ok(Json(MessageResponse::new("2FA enabled successfully")))
}

/// POST /api/auth/2fa/disable
pub async fn two_factor_disable<R: AuthStore>(
    State(state): State<AuthAppState<R>>,
    current: CurrentIdentity,
    Json(req): Json<TwoFactorDisableRequest>,
) -> AuthResult<Json<MessageResponse>> {
    state
        .two_factor_use_case()
        .disable(&current.user_id, &req.token)
        .await?;

    Ok(Json(MessageResponse::new("2FA disabled successfully")))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Session cookies plus the public user view; drops any pending 2FA cookie
fn session_response(config: &AuthConfig, session: &Session) -> Response {
    let cookies = AppendHeaders(vec![
        (
            header::SET_COOKIE,
            config
                .access_cookie()
                .build_set_cookie(&session.access_token.token),
        ),
        (
            header::SET_COOKIE,
            config
                .refresh_cookie()
                .build_set_cookie(&session.refresh_token.token),
        ),
        (
            header::SET_COOKIE,
            config.pending_cookie().build_delete_cookie(),
        ),
    ]);

    (cookies, Json(UserEnvelope::from(&session.identity))).into_response()
}

fn clear_all_cookies(config: &AuthConfig) -> Cookies {
    AppendHeaders(vec![
        (header::SET_COOKIE, config.access_cookie().build_delete_cookie()),
        (header::SET_COOKIE, config.refresh_cookie().build_delete_cookie()),
        (header::SET_COOKIE, config.pending_cookie().build_delete_cookie()),
    ])
}
