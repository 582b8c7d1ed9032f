//! RADIUS-backed credential validation
//!
//! Combines a concurrent positive cache with sliding retention
//! ([`cache::AuthCache`]) and the Access-Request fallback
//! ([`validator::Validator`]). Negative results are never cached.

pub mod cache;
pub mod validator;

pub use cache::{spawn_sweeper, AuthCache};
pub use validator::Validator;
