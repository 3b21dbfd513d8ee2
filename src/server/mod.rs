//! Server core functionality
//!
//! The [`Vault`] service object and the startup work that prepares its
//! on-disk state.

pub mod core;
pub mod state;

pub use core::Vault;
