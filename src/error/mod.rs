//! Error handling
//!
//! Defines the error type and its transport mapping.

pub mod handlers;
pub mod types;

pub use types::*;
