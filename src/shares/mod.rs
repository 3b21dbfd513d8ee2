//! Guest shares
//!
//! Persistent, optionally expiring capabilities that let a guest reach one
//! sub-tree without logging in.

pub mod store;
pub mod types;

pub use store::{SHARE_ID_LENGTH, ShareStore, generate_share_id};
pub use types::{Permission, Share};
