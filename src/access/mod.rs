//! Access control
//!
//! Actors, operation classes and the authorization rules applied before any
//! filesystem operation runs.

pub mod actor;
pub mod permissions;

pub use actor::{Actor, Operation};
pub use permissions::{
    authorize_guest, authorize_identity, authorize_share_creation, authorize_share_removal,
};
