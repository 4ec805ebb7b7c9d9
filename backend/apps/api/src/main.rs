//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request errors render through
//! `auth::AuthError`.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use auth::{
    AuthAppState, AuthConfig, AuthStore, CurrentIdentity, InMemoryAuthRepository,
    PgAuthRepository, UserRole, auth_router, require_auth, require_role,
};
use axum::{
    Json, Router, http,
    http::{Method, header},
    middleware,
    routing::get,
};
use base64::Engine;
use base64::engine::general_purpose;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "technest_api=info,auth=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(load_auth_config()?);
    config.validate().context("invalid auth configuration")?;
    tracing::info!(?config, "Auth configuration loaded");

    let cors = cors_layer();
    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
        .parse()
        .context("BIND_ADDR must be host:port")?;

    let app = match env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;

            tracing::info!("Connected to database");

            // Run migrations
            sqlx::migrate!("../../../database/migrations")
                .run(&pool)
                .await?;

            tracing::info!("Migrations completed");

            let repo = PgAuthRepository::new(pool);

            // Errors here should not prevent server startup
            if let Err(e) = repo.clear_expired_locks().await {
                tracing::warn!(error = %e, "Lock cleanup failed, continuing anyway");
            }

            build_app(AuthAppState::with_system_clock(Arc::new(repo), config))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            build_app(AuthAppState::with_system_clock(
                Arc::new(InMemoryAuthRepository::new()),
                config,
            ))
        }
    };

    let app = app.layer(TraceLayer::new_for_http()).layer(cors);

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the auth configuration from the environment.
///
/// Signing keys are base64. Debug builds fall back to random keys.
fn load_auth_config() -> anyhow::Result<AuthConfig> {
    let access = env::var("ACCESS_TOKEN_SECRET").ok();
    let refresh = env::var("REFRESH_TOKEN_SECRET").ok();

    let mut config = match (access, refresh) {
        (Some(access), Some(refresh)) => AuthConfig::new(
            decode_secret("ACCESS_TOKEN_SECRET", &access)?,
            decode_secret("REFRESH_TOKEN_SECRET", &refresh)?,
        ),
        _ if cfg!(debug_assertions) => {
            tracing::warn!("Token secrets not set, using random development keys");
            AuthConfig::development()
        }
        _ => anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must be set in production"),
    };

    if let Ok(audience) = env::var("JWT_AUDIENCE") {
        config.audience = audience;
    }
    if let Ok(issuer) = env::var("JWT_ISSUER") {
        config.issuer = issuer;
    }
    if let Ok(domain) = env::var("COOKIE_DOMAIN") {
        config.cookie_domain = Some(domain).filter(|d| !d.is_empty());
    }
    if let Ok(secure) = env::var("COOKIE_SECURE") {
        config.cookie_secure = secure
            .parse()
            .context("COOKIE_SECURE must be true or false")?;
    }

    Ok(config)
}

fn decode_secret(name: &str, value: &str) -> anyhow::Result<Vec<u8>> {
    Engine::decode(&general_purpose::STANDARD, value.trim())
        .with_context(|| format!("{} must be base64", name))
}

fn cors_layer() -> CorsLayer {
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PingResponse {
    user_id: String,
    role: UserRole,
}

/// GET /api/admin/ping
async fn admin_ping(current: CurrentIdentity) -> Json<PingResponse> {
    Json(PingResponse {
        user_id: current.user_id.to_string(),
        role: current.role,
    })
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn build_app<R: AuthStore>(state: AuthAppState<R>) -> Router {
    let admin = Router::new()
        .route("/ping", get(admin_ping))
        .route_layer(middleware::from_fn_with_state(UserRole::Admin, require_role))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<R>,
        ));

    let auth_path = state.config.auth_path.clone();

    Router::new()
        .nest(&auth_path, auth_router(state))
        .nest("/api/admin", admin)
        .route("/health", get(health))
}
