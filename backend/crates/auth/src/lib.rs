//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits
//! - `application/` - Use cases, token issuing, session renewal
//! - `infra/` - PostgreSQL and in-memory repositories
//! - `presentation/` - HTTP handlers, DTOs, middleware, router
//!
//! ## Features
//! - Registration and login with email + password
//! - Optional TOTP-based 2FA (authenticator app compatible)
//! - Stateless HS256 access/refresh tokens carried in cookies
//! - Refresh token revocation through a per-identity token version
//! - Role-based access (User, Admin)
//!
//! ## Security Model
//! - Passwords hashed with Argon2id off the async runtime
//! - Automatic lockout after repeated failed logins
//! - Access, refresh and pending-2FA tokens are not interchangeable

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use application::check_session::CurrentIdentity;
pub use domain::repository::AuthStore;
pub use domain::value_object::user_role::UserRole;
pub use error::{AuthError, AuthResult};
pub use infra::{InMemoryAuthRepository, PgAuthRepository};
pub use presentation::{AuthAppState, auth_router, require_auth, require_role};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}
