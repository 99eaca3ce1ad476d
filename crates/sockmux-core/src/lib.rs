//! # sockmux-core
//!
//! Core types for the sockmux sockets facility.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The socket layer and the readiness reactor live in the `sockmux` crate.
//!
//! ## Modules
//!
//! - `error` - Error types shared across the facility
//! - `logging` - Leveled stderr logging macros
//! - `crypto` - Hashing and random-number pass-throughs
//! - `time` - Wall-clock helper

pub mod crypto;
pub mod error;
pub mod logging;
pub mod time;

// Re-exports for convenience
pub use error::{SockError, SockResult};
pub use logging::{set_log_level, LogLevel};
