//! Infrastructure Layer
//!
//! Storage implementations of the repository traits.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryAuthRepository;
pub use postgres::PgAuthRepository;
