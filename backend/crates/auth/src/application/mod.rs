//! Application Layer
//!
//! Use cases and application services.

pub mod check_session;
pub mod config;
pub mod login;
pub mod logout;
pub mod refresh;
pub mod register;
pub mod renewal;
pub mod token;
pub mod two_factor;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use check_session::{CheckSessionUseCase, CurrentIdentity};
pub use config::AuthConfig;
pub use login::{LoginInput, LoginOutcome, LoginUseCase, Session};
pub use logout::LogoutUseCase;
pub use refresh::RefreshUseCase;
pub use register::{RegisterInput, RegisterUseCase};
pub use renewal::{InProcessRefresher, RenewalError, SessionRenewal, SessionState, TokenRefresher};
pub use token::{IssuedToken, TokenError, TokenIssuer};
pub use two_factor::TwoFactorUseCase;
