//! Access control decisions
//!
//! The resolver only enforces containment. Whether an actor may perform an
//! operation on a resolved path is decided here, before any filesystem call.

use crate::access::actor::Operation;
use crate::auth::Identity;
use crate::error::VaultError;
use crate::shares::{Permission, Share};
use crate::storage::{ResolvedPath, Scope};

/// Shared area: readable by every identity, writable only by the allow-list.
/// Private roots are only ever resolved for their owner.
pub fn authorize_identity(
    identity: &Identity,
    target: &ResolvedPath,
    operation: Operation,
) -> Result<(), VaultError> {
    if operation.is_mutating() && target.scope() == Scope::Shared && !identity.can_write_shared() {
        return Err(VaultError::Forbidden(format!(
            "{} may not {} in shared storage",
            identity.name(),
            operation.as_str()
        )));
    }
    Ok(())
}

/// A guest may mutate only through a read-write share.
pub fn authorize_guest(share: &Share, operation: Operation) -> Result<(), VaultError> {
    if operation.is_mutating() && !share.permissions.allows_write() {
        return Err(VaultError::Forbidden(format!(
            "Share {} is read-only",
            share.share_id
        )));
    }
    Ok(())
}

/// Who may create a share on a target, and with which permission.
pub fn authorize_share_creation(
    identity: &Identity,
    target: &ResolvedPath,
    permission: Permission,
    target_is_dir: bool,
) -> Result<(), VaultError> {
    if target.scope() == Scope::Shared && !identity.can_write_shared() {
        return Err(VaultError::Forbidden(
            "Only shared-storage writers can share shared files".into(),
        ));
    }
    if !target_is_dir && permission.allows_write() {
        return Err(VaultError::Forbidden(
            "Files can only be shared read-only".into(),
        ));
    }
    Ok(())
}

/// Private shares belong to their owner; shared-area shares to the writers.
pub fn authorize_share_removal(identity: &Identity, share: &Share) -> Result<(), VaultError> {
    match share.storage_type {
        Scope::Shared if !identity.can_write_shared() => Err(VaultError::Forbidden(
            "Only shared-storage writers can remove shared shares".into(),
        )),
        Scope::Private if share.username.as_deref() != Some(identity.name()) => {
            Err(VaultError::Forbidden("Share belongs to another user".into()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(permission: Permission, scope: Scope, owner: Option<&str>) -> Share {
        Share {
            share_id: "abc".into(),
            path: "docs".into(),
            storage_type: scope,
            username: owner.map(str::to_string),
            permissions: permission,
            expires_at: None,
            created_at: 0,
        }
    }

    #[test]
    fn read_only_share_blocks_mutations() {
        let read = share(Permission::Read, Scope::Shared, None);
        assert!(authorize_guest(&read, Operation::List).is_ok());
        assert!(authorize_guest(&read, Operation::Download).is_ok());
        for op in [Operation::Create, Operation::Upload, Operation::Move, Operation::Copy, Operation::Delete] {
            assert!(matches!(authorize_guest(&read, op), Err(VaultError::Forbidden(_))));
        }

        let write = share(Permission::ReadWrite, Scope::Shared, None);
        assert!(authorize_guest(&write, Operation::Delete).is_ok());
    }

    #[test]
    fn share_removal_rules() {
        let alice = Identity::new("alice", false);
        let writer = Identity::new("root-writer", true);

        let private = share(Permission::Read, Scope::Private, Some("alice"));
        assert!(authorize_share_removal(&alice, &private).is_ok());
        assert!(authorize_share_removal(&writer, &private).is_err());

        let shared = share(Permission::Read, Scope::Shared, None);
        assert!(authorize_share_removal(&alice, &shared).is_err());
        assert!(authorize_share_removal(&writer, &shared).is_ok());
    }
}
