//! Shared Kernel - Domain-crossing minimal core
//!
//! - Common error type ([`error::app_error::AppError`]) rendered as RFC 7807
//! - Typed UUID identifiers
//!
//! Only vocabulary with the same meaning in every crate belongs here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
