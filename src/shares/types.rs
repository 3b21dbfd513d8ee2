//! Share records

use serde::{Deserialize, Serialize};

use crate::storage::Scope;

/// What a guest holding a share may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    ReadWrite,
}

impl Permission {
    pub fn allows_write(&self) -> bool {
        matches!(self, Permission::ReadWrite)
    }
}

/// A persisted guest capability for a sub-tree of one storage area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub share_id: String,
    /// Target, relative to the scope root
    pub path: String,
    pub storage_type: Scope,
    /// Owning identity; only meaningful for private shares
    pub username: Option<String>,
    pub permissions: Permission,
    /// Epoch seconds; `None` never expires
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl Share {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}
