//! Who is acting, and what they are asking to do.

use std::fmt;

use crate::auth::Identity;

/// The party on whose behalf an operation runs.
#[derive(Debug, Clone)]
pub enum Actor {
    /// A logged-in user, identity already validated by the caller
    Identity(Identity),
    /// Anyone presenting a share id
    Guest { share_id: String },
}

impl Actor {
    pub fn guest(share_id: impl Into<String>) -> Self {
        Actor::Guest {
            share_id: share_id.into(),
        }
    }

    /// Stable key used to bind upload sessions to their creator.
    pub fn key(&self) -> String {
        match self {
            Actor::Identity(identity) => format!("user:{}", identity.name()),
            Actor::Guest { share_id } => format!("share:{share_id}"),
        }
    }
}

impl From<Identity> for Actor {
    fn from(identity: Identity) -> Self {
        Actor::Identity(identity)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Identity(identity) => write!(f, "user {}", identity.name()),
            Actor::Guest { share_id } => write!(f, "guest via share {share_id}"),
        }
    }
}

/// Operation classes, split by whether they modify storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Read,
    Search,
    Download,
    Create,
    Upload,
    Move,
    Copy,
    Delete,
    Write,
}

impl Operation {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::Upload
                | Operation::Move
                | Operation::Copy
                | Operation::Delete
                | Operation::Write
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Read => "read",
            Operation::Search => "search",
            Operation::Download => "download",
            Operation::Create => "create",
            Operation::Upload => "upload",
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::Delete => "delete",
            Operation::Write => "write",
        }
    }
}
