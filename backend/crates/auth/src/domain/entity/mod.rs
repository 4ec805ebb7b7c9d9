//! Domain Entities

pub mod credentials;
pub mod identity;

pub use credentials::{Credentials, LockoutPolicy, LockoutState};
pub use identity::Identity;
