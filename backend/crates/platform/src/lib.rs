//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Password hashing (Argon2id with configurable cost)
//! - Cookie building and parsing
//! - Injectable clock
//! - Random bytes and key fingerprints

pub mod clock;
pub mod cookie;
pub mod crypto;
pub mod password;
