//! Share store
//!
//! The whole share table lives in one JSON file. Every mutation rewrites it
//! through a temporary file and a rename, so a crash mid-write leaves the
//! previous table intact. A process-wide mutex serializes the
//! load-modify-save cycle.

use chrono::Utc;
use log::{info, warn};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::VaultError;
use crate::shares::types::{Permission, Share};
use crate::storage::Scope;

pub const SHARE_ID_LENGTH: usize = 16;

const SHARE_ID_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
    's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

type ShareTable = BTreeMap<String, Share>;

/// Generates an unguessable share id from the OS-seeded CSPRNG.
pub fn generate_share_id() -> String {
    nanoid::nanoid!(SHARE_ID_LENGTH, &SHARE_ID_ALPHABET)
}

pub struct ShareStore {
    file: PathBuf,
    lock: Mutex<()>,
}

impl ShareStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Persists a new share under a freshly generated, unused id.
    pub async fn create(
        &self,
        target_path: &str,
        scope: Scope,
        owner: Option<&str>,
        permission: Permission,
        expires_at: Option<i64>,
    ) -> Result<Share, VaultError> {
        if scope == Scope::Private && owner.is_none() {
            return Err(VaultError::AuthorizationRequired(
                "Private shares need an owner".into(),
            ));
        }

        let _guard = self.lock.lock().await;
        let mut shares = self.load().await?;

        let share_id = loop {
            let candidate = generate_share_id();
            if !shares.contains_key(&candidate) {
                break candidate;
            }
        };

        let share = Share {
            share_id: share_id.clone(),
            path: target_path.to_string(),
            storage_type: scope,
            username: match scope {
                Scope::Private => owner.map(str::to_string),
                Scope::Shared => None,
            },
            permissions: permission,
            expires_at,
            created_at: Utc::now().timestamp(),
        };

        shares.insert(share_id, share.clone());
        self.save(&shares).await?;

        info!(
            "Created {} share {} for {}:{}",
            match permission {
                Permission::Read => "read",
                Permission::ReadWrite => "read-write",
            },
            share.share_id,
            scope,
            share.path
        );

        Ok(share)
    }

    /// Looks up a share; an expired share is purged and reported absent.
    pub async fn get(&self, share_id: &str) -> Result<Option<Share>, VaultError> {
        let _guard = self.lock.lock().await;
        let mut shares = self.load().await?;

        let Some(share) = shares.get(share_id) else {
            return Ok(None);
        };

        if share.is_expired(Utc::now().timestamp()) {
            shares.remove(share_id);
            self.save(&shares).await?;
            info!("Share {} expired and was removed", share_id);
            return Ok(None);
        }

        Ok(Some(share.clone()))
    }

    /// Removes a share. Private shares may only be removed by their owner;
    /// shared-area authorization is the caller's job.
    pub async fn delete(&self, share_id: &str, requester: &str) -> Result<bool, VaultError> {
        let _guard = self.lock.lock().await;
        let mut shares = self.load().await?;

        let Some(share) = shares.get(share_id) else {
            return Ok(false);
        };

        if share.storage_type == Scope::Private && share.username.as_deref() != Some(requester) {
            return Ok(false);
        }

        shares.remove(share_id);
        self.save(&shares).await?;
        info!("Share {} deleted by {}", share_id, requester);
        Ok(true)
    }

    /// Non-expired shares in `scope` visible to `identity`, optionally for one target.
    pub async fn list_for(
        &self,
        identity: &str,
        scope: Scope,
        path: Option<&str>,
    ) -> Result<Vec<Share>, VaultError> {
        let _guard = self.lock.lock().await;
        let shares = self.load().await?;
        let now = Utc::now().timestamp();

        Ok(shares
            .into_values()
            .filter(|share| !share.is_expired(now))
            .filter(|share| share.storage_type == scope)
            .filter(|share| {
                scope != Scope::Private || share.username.as_deref() == Some(identity)
            })
            .filter(|share| path.is_none_or(|p| share.path == p))
            .collect())
    }

    async fn load(&self) -> Result<ShareTable, VaultError> {
        match fs::read(&self.file).await {
            Ok(bytes) if bytes.is_empty() => Ok(ShareTable::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                warn!("Share table {} is unreadable: {}", self.file.display(), e);
                VaultError::from(e)
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ShareTable::new()),
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    async fn save(&self, shares: &ShareTable) -> Result<(), VaultError> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(shares)?;
        let temp_file = self.file.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_file).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_file, &self.file).await {
            let _ = fs::remove_file(&temp_file).await;
            return Err(VaultError::Io(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ids_have_fixed_length_and_alphabet() {
        let id = generate_share_id();
        assert_eq!(id.len(), SHARE_ID_LENGTH);
        assert!(id.chars().all(|c| SHARE_ID_ALPHABET.contains(&c)));
    }

    #[tokio::test]
    async fn table_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("state/shares.json");

        let share = {
            let store = ShareStore::new(&file);
            store
                .create("docs", Scope::Shared, None, Permission::Read, None)
                .await
                .unwrap()
        };

        let reopened = ShareStore::new(&file);
        let loaded = reopened.get(&share.share_id).await.unwrap().unwrap();
        assert_eq!(loaded, share);
        assert!(!file.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_table_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("shares.json");
        std::fs::write(&file, "{ not json").unwrap();

        let store = ShareStore::new(&file);
        let result = store
            .create("docs", Scope::Shared, None, Permission::Read, None)
            .await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn private_share_requires_owner() {
        let dir = TempDir::new().unwrap();
        let store = ShareStore::new(dir.path().join("shares.json"));
        assert!(
            store
                .create("docs", Scope::Private, None, Permission::Read, None)
                .await
                .is_err()
        );
    }
}
