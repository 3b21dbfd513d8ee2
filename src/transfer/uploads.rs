//! Chunked uploads
//!
//! A session is opened for a destination file, receives numbered chunks in
//! any order (possibly concurrently), and is finalized once every index in
//! `0..total_chunks` has arrived. Chunks are kept in a per-session scratch
//! directory until then.
//!
//! Closing a session is the single point of ownership transfer: whichever
//! call marks it closed and takes it out of the map (finalize, cancel, a
//! failed chunk or the idle sweep) is the only one that cleans up its
//! scratch storage.

use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::VaultError;
use crate::storage::ResolvedPath;
use crate::storage::filesystem::{ensure_not_exists, ensure_parent_directory};
use crate::transfer::blocking;
use crate::transfer::file_ops::{finish_upload, temp_sibling};
use crate::transfer::results::CompletedUpload;

struct UploadSession {
    destination: ResolvedPath,
    total_chunks: u32,
    received: BTreeSet<u32>,
    chunk_dir: PathBuf,
    closed: bool,
    last_activity: Instant,
}

struct SessionHandle {
    owner: String,
    state: Mutex<UploadSession>,
}

pub struct UploadRegistry {
    scratch_dir: PathBuf,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl UploadRegistry {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a session for a file that must not exist yet. Returns the upload id.
    pub async fn init(
        &self,
        owner: &str,
        destination: ResolvedPath,
        total_chunks: u32,
    ) -> Result<String, VaultError> {
        if total_chunks == 0 {
            return Err(VaultError::InvalidPath(
                "An upload needs at least one chunk".into(),
            ));
        }

        check_destination(&destination).await?;

        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        let chunk_dir = self.scratch_dir.join(&upload_id);
        fs::create_dir_all(&chunk_dir).await?;

        info!(
            "Upload {} started by {}: {} chunks -> {}",
            upload_id,
            owner,
            total_chunks,
            destination.as_path().display()
        );

        let handle = SessionHandle {
            owner: owner.to_string(),
            state: Mutex::new(UploadSession {
                destination,
                total_chunks,
                received: BTreeSet::new(),
                chunk_dir,
                closed: false,
                last_activity: Instant::now(),
            }),
        };

        self.sessions
            .lock()
            .await
            .insert(upload_id.clone(), Arc::new(handle));

        Ok(upload_id)
    }

    /// Stores one chunk. Re-sending an index replaces the earlier copy.
    ///
    /// A chunk that cannot be stored discards the whole session.
    pub async fn save_chunk(
        &self,
        owner: &str,
        upload_id: &str,
        index: u32,
        data: &[u8],
        max_chunk_size: u64,
    ) -> Result<(), VaultError> {
        let handle = self.session(owner, upload_id).await?;
        let mut session = handle.state.lock().await;
        if session.closed {
            return Err(VaultError::NotFound(format!("upload {upload_id}")));
        }

        if let Err(e) = store_chunk(&session, index, data, max_chunk_size).await {
            session.closed = true;
            let chunk_dir = session.chunk_dir.clone();
            drop(session);

            self.sessions.lock().await.remove(upload_id);
            cleanup(&chunk_dir).await;
            warn!("Upload {} aborted at chunk {}: {}", upload_id, index, e);
            return Err(e);
        }

        session.received.insert(index);
        session.last_activity = Instant::now();
        debug!(
            "Upload {}: chunk {} stored ({}/{})",
            upload_id,
            index,
            session.received.len(),
            session.total_chunks
        );
        Ok(())
    }

    /// Concatenates all chunks in index order into the destination.
    ///
    /// A missing chunk aborts the upload; its scratch storage is removed
    /// before the error is returned.
    pub async fn finalize(
        &self,
        owner: &str,
        upload_id: &str,
        max_size: u64,
    ) -> Result<CompletedUpload, VaultError> {
        let handle = self.take(owner, upload_id).await?;
        let mut session = handle.state.lock().await;
        if session.closed {
            return Err(VaultError::NotFound(format!("upload {upload_id}")));
        }
        session.closed = true;

        let result = assemble(&session, max_size).await;
        cleanup(&session.chunk_dir).await;

        match &result {
            Ok(done) => info!("Upload {} finalized: {} ({} bytes)", upload_id, done.path, done.size),
            Err(e) => warn!("Upload {} failed: {}", upload_id, e),
        }
        result
    }

    /// Discards a session and its chunks.
    pub async fn cancel(&self, owner: &str, upload_id: &str) -> Result<(), VaultError> {
        let handle = self.take(owner, upload_id).await?;
        let mut session = handle.state.lock().await;
        if session.closed {
            return Err(VaultError::NotFound(format!("upload {upload_id}")));
        }
        session.closed = true;
        cleanup(&session.chunk_dir).await;
        info!("Upload {} cancelled", upload_id);
        Ok(())
    }

    /// Indices received so far, for resuming clients.
    pub async fn received(&self, owner: &str, upload_id: &str) -> Result<Vec<u32>, VaultError> {
        let handle = self.session(owner, upload_id).await?;
        let session = handle.state.lock().await;
        Ok(session.received.iter().copied().collect())
    }

    /// Discards sessions that received nothing for `max_idle`. Returns how many.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut expired = Vec::new();
        {
            let mut sessions = self.sessions.lock().await;
            sessions.retain(|upload_id, handle| {
                // A locked session is busy with a chunk or a finalize.
                let Ok(mut session) = handle.state.try_lock() else {
                    return true;
                };
                if session.closed || session.last_activity.elapsed() < max_idle {
                    return true;
                }
                session.closed = true;
                expired.push((upload_id.clone(), session.chunk_dir.clone()));
                false
            });
        }

        for (upload_id, chunk_dir) in &expired {
            cleanup(chunk_dir).await;
            info!("Upload {} expired after {}s without chunks", upload_id, max_idle.as_secs());
        }
        expired.len()
    }

    async fn session(&self, owner: &str, upload_id: &str) -> Result<Arc<SessionHandle>, VaultError> {
        let sessions = self.sessions.lock().await;
        let handle = sessions
            .get(upload_id)
            .ok_or_else(|| VaultError::NotFound(format!("upload {upload_id}")))?;
        if handle.owner != owner {
            return Err(VaultError::Forbidden(format!(
                "upload {upload_id} belongs to another session"
            )));
        }
        Ok(Arc::clone(handle))
    }

    async fn take(&self, owner: &str, upload_id: &str) -> Result<Arc<SessionHandle>, VaultError> {
        let mut sessions = self.sessions.lock().await;
        let owned = match sessions.get(upload_id) {
            Some(handle) => handle.owner == owner,
            None => return Err(VaultError::NotFound(format!("upload {upload_id}"))),
        };
        if !owned {
            return Err(VaultError::Forbidden(format!(
                "upload {upload_id} belongs to another session"
            )));
        }
        sessions
            .remove(upload_id)
            .ok_or_else(|| VaultError::NotFound(format!("upload {upload_id}")))
    }
}

async fn assemble(session: &UploadSession, max_size: u64) -> Result<CompletedUpload, VaultError> {
    let missing: Vec<u32> = (0..session.total_chunks)
        .filter(|index| !session.received.contains(index))
        .collect();
    if !missing.is_empty() {
        return Err(VaultError::IncompleteUpload { missing });
    }

    let destination = &session.destination;
    check_destination(destination).await?;

    let temp_path = temp_sibling(destination, "assemble");
    let written = concatenate(session, &temp_path, max_size).await;
    let size = match written {
        Ok(size) => size,
        Err(e) => {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
    };

    let target = destination.clone();
    blocking(move || finish_upload(&temp_path, &target)).await?;

    Ok(CompletedUpload {
        path: destination.logical(),
        size,
    })
}

async fn check_destination(destination: &ResolvedPath) -> Result<(), VaultError> {
    let destination = destination.clone();
    blocking(move || {
        destination.reverify()?;
        ensure_parent_directory(&destination)?;
        ensure_not_exists(&destination)
    })
    .await
}

async fn store_chunk(
    session: &UploadSession,
    index: u32,
    data: &[u8],
    max_chunk_size: u64,
) -> Result<(), VaultError> {
    if data.len() as u64 > max_chunk_size {
        return Err(VaultError::Forbidden(format!(
            "Chunk exceeds the {max_chunk_size} byte limit"
        )));
    }
    if index >= session.total_chunks {
        return Err(VaultError::InvalidPath(format!(
            "Chunk index {index} outside 0..{}",
            session.total_chunks
        )));
    }

    let part = session.chunk_dir.join(format!("{index}.part"));
    let temp = session.chunk_dir.join(format!("{index}.part.tmp"));
    fs::write(&temp, data).await?;
    fs::rename(&temp, &part).await?;
    Ok(())
}

async fn concatenate(
    session: &UploadSession,
    temp_path: &std::path::Path,
    max_size: u64,
) -> Result<u64, VaultError> {
    let mut output = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .await?;

    let mut total = 0u64;
    for index in 0..session.total_chunks {
        let mut chunk = fs::File::open(session.chunk_dir.join(format!("{index}.part"))).await?;
        total += tokio::io::copy(&mut chunk, &mut output).await?;
        if total > max_size {
            return Err(VaultError::Forbidden(format!(
                "File exceeds the {max_size} byte upload limit"
            )));
        }
    }

    output.flush().await?;
    output.sync_all().await?;
    Ok(total)
}

async fn cleanup(chunk_dir: &std::path::Path) {
    if let Err(e) = fs::remove_dir_all(chunk_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove upload scratch {}: {}", chunk_dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StartupConfig;
    use crate::storage::{PathResolver, StorageRoots};
    use tempfile::TempDir;

    const LIMIT: u64 = 1024 * 1024;

    fn setup() -> (TempDir, PathResolver, UploadRegistry) {
        let dir = TempDir::new().unwrap();
        let config = StartupConfig {
            root_dir: dir.path().to_string_lossy().to_string(),
            shared_dir: "shared".into(),
            users_dir: "users".into(),
            shares_file: None,
            uploads_dir: None,
            jwt_secret: "secret".into(),
            legacy_unscoped_paths: false,
            welcome_message: None,
            users: Vec::new(),
        };
        let registry = UploadRegistry::new(config.uploads_dir_path());
        let roots = StorageRoots::prepare(&config).unwrap();
        (dir, PathResolver::new(roots, false), registry)
    }

    #[tokio::test]
    async fn chunks_assemble_in_index_order() {
        let (_dir, resolver, registry) = setup();
        let target = resolver.resolve("shared/big.bin", None).unwrap();
        let id = registry.init("user:alice", target.clone(), 3).await.unwrap();

        for index in [2u32, 0, 1] {
            let data = format!("chunk-{index}");
            registry
                .save_chunk("user:alice", &id, index, data.as_bytes(), LIMIT)
                .await
                .unwrap();
        }

        let done = registry.finalize("user:alice", &id, LIMIT).await.unwrap();
        assert_eq!(done.path, "shared/big.bin");
        assert_eq!(
            std::fs::read_to_string(target.as_path()).unwrap(),
            "chunk-0chunk-1chunk-2"
        );
    }

    #[tokio::test]
    async fn missing_chunk_aborts_and_cleans_up() {
        let (dir, resolver, registry) = setup();
        let target = resolver.resolve("shared/partial.bin", None).unwrap();
        let id = registry.init("user:alice", target.clone(), 3).await.unwrap();
        registry.save_chunk("user:alice", &id, 0, b"a", LIMIT).await.unwrap();
        registry.save_chunk("user:alice", &id, 2, b"c", LIMIT).await.unwrap();

        let err = registry.finalize("user:alice", &id, LIMIT).await.unwrap_err();
        assert!(matches!(err, VaultError::IncompleteUpload { ref missing } if missing == &vec![1]));
        assert!(!target.as_path().exists());
        assert!(!dir.path().join(".vault/uploads").join(&id).exists());

        // The session is gone after the failed attempt.
        let again = registry.finalize("user:alice", &id, LIMIT).await.unwrap_err();
        assert!(matches!(again, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn sessions_are_bound_to_their_owner() {
        let (_dir, resolver, registry) = setup();
        let target = resolver.resolve("shared/owned.bin", None).unwrap();
        let id = registry.init("user:alice", target, 1).await.unwrap();

        let err = registry.save_chunk("user:bob", &id, 0, b"x", LIMIT).await.unwrap_err();
        assert!(matches!(err, VaultError::Forbidden(_)));
        let err = registry.cancel("user:bob", &id).await.unwrap_err();
        assert!(matches!(err, VaultError::Forbidden(_)));

        registry.cancel("user:alice", &id).await.unwrap();
        let err = registry.received("user:alice", &id).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_bad_indices_and_existing_targets() {
        let (_dir, resolver, registry) = setup();
        let target = resolver.resolve("shared/taken.txt", None).unwrap();

        let err = registry.init("user:alice", target.clone(), 0).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPath(_)));

        let id = registry.init("user:alice", target.clone(), 2).await.unwrap();
        let err = registry.save_chunk("user:alice", &id, 2, b"x", LIMIT).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPath(_)));

        let id = registry.init("user:alice", target.clone(), 2).await.unwrap();
        let err = registry.save_chunk("user:alice", &id, 0, b"too big", 3).await.unwrap_err();
        assert!(matches!(err, VaultError::Forbidden(_)));

        std::fs::write(target.as_path(), b"already here").unwrap();
        let err = registry.init("user:alice", target, 1).await.unwrap_err();
        assert!(matches!(err, VaultError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn failed_chunk_discards_the_session() {
        let (dir, resolver, registry) = setup();
        let target = resolver.resolve("shared/broken.bin", None).unwrap();
        let id = registry.init("user:alice", target.clone(), 3).await.unwrap();
        registry.save_chunk("user:alice", &id, 0, b"ok", LIMIT).await.unwrap();
        let scratch = dir.path().join(".vault/uploads").join(&id);
        assert!(scratch.join("0.part").is_file());

        let err = registry
            .save_chunk("user:alice", &id, 1, b"far too large", 4)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Forbidden(_)));
        assert!(!scratch.exists());

        let err = registry.received("user:alice", &id).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        let err = registry.save_chunk("user:alice", &id, 1, b"b", LIMIT).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        assert!(!target.as_path().exists());
    }

    #[tokio::test]
    async fn idle_sessions_are_swept() {
        let (dir, resolver, registry) = setup();
        let target = resolver.resolve("shared/idle.bin", None).unwrap();
        let id = registry.init("user:alice", target, 2).await.unwrap();
        registry.save_chunk("user:alice", &id, 0, b"a", LIMIT).await.unwrap();
        assert_eq!(registry.received("user:alice", &id).await.unwrap(), vec![0]);

        assert_eq!(registry.sweep_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.sweep_idle(Duration::ZERO).await, 1);

        assert!(!dir.path().join(".vault/uploads").join(&id).exists());
        let err = registry.finalize("user:alice", &id, LIMIT).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }
}
