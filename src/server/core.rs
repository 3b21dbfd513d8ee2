//! The vault service
//!
//! [`Vault`] is what the API layer talks to. Every entry point takes an
//! [`Actor`] and untrusted logical paths; it resolves them, applies access
//! control, and only then hands [`ResolvedPath`]s to the storage and
//! transfer operations.

use log::{debug, info, warn};
use std::io::{Cursor, Read, Seek, Write};
use std::sync::Arc;

use crate::access::{
    Actor, Operation, authorize_guest, authorize_identity, authorize_share_creation,
    authorize_share_removal,
};
use crate::auth::{Identity, IdentityRegistry, LoginService, TokenService};
use crate::config::{SharedRuntimeConfig, VaultConfig};
use crate::error::{ErrorKind, VaultError};
use crate::middleware::logging::{log_operation, log_rejected_path};
use crate::server::state::prepare_layout;
use crate::shares::{Permission, Share, ShareStore};
use crate::storage::{
    DirectoryEntry, DownloadTarget, PathResolver, ResolvedPath, Scope, SearchHit, TreeNode,
    hierarchy, operations,
};
use crate::transfer::{
    ArchiveSummary, BatchSummary, CompletedUpload, UploadItem, UploadRegistry, blocking,
    store_upload, write_archive,
};

pub struct Vault {
    resolver: PathResolver,
    shares: ShareStore,
    uploads: UploadRegistry,
    registry: Arc<IdentityRegistry>,
    login: LoginService,
    runtime: SharedRuntimeConfig,
}

impl Vault {
    /// Prepares the storage layout and wires up every service.
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let (startup, runtime) = config.split();

        let registry = Arc::new(IdentityRegistry::from_entries(&startup.users));
        if registry.is_empty() {
            warn!("No users configured; only guests with existing shares can connect");
        }

        let roots = prepare_layout(&startup, &registry)?;
        let resolver = PathResolver::new(roots, startup.legacy_unscoped_paths);
        if startup.legacy_unscoped_paths {
            info!("Unscoped paths are routed to shared storage (deprecated)");
        }

        let shares = ShareStore::new(startup.shares_file_path());
        let uploads = UploadRegistry::new(startup.uploads_dir_path());
        let tokens = TokenService::new(&startup.jwt_secret);
        let login = LoginService::new(Arc::clone(&registry), tokens, Arc::clone(&runtime));

        info!(
            "Vault ready: {} users, shares in {}",
            registry.len(),
            shares.file().display()
        );

        Ok(Self {
            resolver,
            shares,
            uploads,
            registry,
            login,
            runtime,
        })
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Live runtime settings; updates apply to the next request.
    pub fn runtime(&self) -> SharedRuntimeConfig {
        Arc::clone(&self.runtime)
    }

    // ═══ AUTHENTICATION ═══

    pub async fn login(&self, username: &str, password: &str) -> Result<String, VaultError> {
        self.login.login(username, password).await
    }

    pub fn authenticate(&self, token: &str) -> Result<Identity, VaultError> {
        self.login.authenticate(token)
    }

    // ═══ READING ═══

    pub async fn list(&self, actor: &Actor, path: &str) -> Result<Vec<DirectoryEntry>, VaultError> {
        let dir = self.target(actor, path, Operation::List).await?;
        blocking(move || operations::list_directory(&dir)).await
    }

    pub async fn hierarchy(&self, actor: &Actor, path: &str) -> Result<TreeNode, VaultError> {
        let dir = self.target(actor, path, Operation::List).await?;
        blocking(move || hierarchy::build_hierarchy(&dir)).await
    }

    pub async fn search(
        &self,
        actor: &Actor,
        path: &str,
        query: &str,
    ) -> Result<Vec<SearchHit>, VaultError> {
        let dir = self.target(actor, path, Operation::Search).await?;
        let query = query.to_string();
        blocking(move || hierarchy::search(&dir, &query)).await
    }

    pub async fn read_text(&self, actor: &Actor, path: &str) -> Result<String, VaultError> {
        let file = self.target(actor, path, Operation::Read).await?;
        blocking(move || operations::read_text(&file)).await
    }

    pub async fn open_download(&self, actor: &Actor, path: &str) -> Result<DownloadTarget, VaultError> {
        let file = self.target(actor, path, Operation::Download).await?;
        let download = blocking(move || operations::open_download(&file)).await?;
        debug!("{} downloading {}", actor, download.path.display());
        Ok(download)
    }

    // ═══ MUTATIONS ═══

    /// Creates an empty file `name` inside `dir`. Returns its logical path.
    pub async fn create_file(&self, actor: &Actor, dir: &str, name: &str) -> Result<String, VaultError> {
        let target = self.new_entry(actor, dir, name, Operation::Create).await?;
        let logged = target.clone();
        blocking(move || operations::create_file(&target)).await?;
        log_operation(&actor.to_string(), "create file", logged.as_path());
        Ok(logged.logical())
    }

    /// Creates directory `name` inside `dir`. Returns its logical path.
    pub async fn create_directory(
        &self,
        actor: &Actor,
        dir: &str,
        name: &str,
    ) -> Result<String, VaultError> {
        let target = self.new_entry(actor, dir, name, Operation::Create).await?;
        let logged = target.clone();
        blocking(move || operations::create_directory(&target)).await?;
        log_operation(&actor.to_string(), "create directory", logged.as_path());
        Ok(logged.logical())
    }

    /// Moves `src` to the full destination path `dst`.
    pub async fn move_entry(&self, actor: &Actor, src: &str, dst: &str) -> Result<String, VaultError> {
        let source = self.target(actor, src, Operation::Move).await?;
        let destination = self.target(actor, dst, Operation::Move).await?;
        let logged = destination.clone();
        blocking(move || operations::move_entry(&source, &destination)).await?;
        log_operation(&actor.to_string(), "move", logged.as_path());
        Ok(logged.logical())
    }

    /// Copies `src` to the full destination path `dst`. Only the destination
    /// needs write access.
    pub async fn copy_entry(&self, actor: &Actor, src: &str, dst: &str) -> Result<String, VaultError> {
        let source = self.target(actor, src, Operation::Read).await?;
        let destination = self.target(actor, dst, Operation::Copy).await?;
        let logged = destination.clone();
        blocking(move || operations::copy_entry(&source, &destination)).await?;
        log_operation(&actor.to_string(), "copy", logged.as_path());
        Ok(logged.logical())
    }

    pub async fn delete(&self, actor: &Actor, path: &str) -> Result<(), VaultError> {
        let target = self.target(actor, path, Operation::Delete).await?;
        let logged = target.clone();
        blocking(move || operations::delete_entry(&target)).await?;
        log_operation(&actor.to_string(), "delete", logged.as_path());
        Ok(())
    }

    pub async fn save_text(&self, actor: &Actor, path: &str, content: &str) -> Result<(), VaultError> {
        let target = self.target(actor, path, Operation::Write).await?;
        let logged = target.clone();
        let content = content.to_string();
        blocking(move || operations::save_text(&target, &content)).await?;
        log_operation(&actor.to_string(), "save", logged.as_path());
        Ok(())
    }

    // ═══ UPLOADS ═══

    /// Streams one file into `dir/name`. Returns the stored size.
    pub async fn upload_file<R>(
        &self,
        actor: &Actor,
        dir: &str,
        name: &str,
        source: R,
    ) -> Result<u64, VaultError>
    where
        R: Read + Send + 'static,
    {
        let target = self.new_entry(actor, dir, name, Operation::Upload).await?;
        let max_size = self.runtime.read().await.max_upload_size_bytes();
        let logged = target.clone();
        let size = blocking(move || store_upload(source, &target, max_size)).await?;
        log_operation(&actor.to_string(), "upload", logged.as_path());
        Ok(size)
    }

    /// Stores several files into `dir`. Failed items are counted, not reported.
    pub async fn upload_files(
        &self,
        actor: &Actor,
        dir: &str,
        items: Vec<UploadItem>,
    ) -> Result<BatchSummary, VaultError> {
        let dir = self.target(actor, dir, Operation::Upload).await?;
        let max_size = self.runtime.read().await.max_upload_size_bytes();
        let actor_name = actor.to_string();

        blocking(move || {
            let mut summary = BatchSummary::default();
            for item in items {
                let stored = dir
                    .child(&item.name)
                    .and_then(|target| {
                        store_upload(Cursor::new(item.data), &target, max_size).map(|_| target)
                    });
                match stored {
                    Ok(target) => {
                        log_operation(&actor_name, "upload", target.as_path());
                        summary.succeeded += 1;
                    }
                    Err(e) => {
                        warn!("Upload of {:?} by {} failed: {}", item.name, actor_name, e);
                        summary.failed += 1;
                    }
                }
            }
            Ok(summary)
        })
        .await
    }

    /// Opens a chunked upload for `dir/name`. Returns the upload id.
    pub async fn init_upload(
        &self,
        actor: &Actor,
        dir: &str,
        name: &str,
        total_chunks: u32,
    ) -> Result<String, VaultError> {
        let target = self.new_entry(actor, dir, name, Operation::Upload).await?;
        let max_idle = self.runtime.read().await.upload_idle_timeout();
        self.uploads.sweep_idle(max_idle).await;
        self.uploads.init(&actor.key(), target, total_chunks).await
    }

    pub async fn upload_chunk(
        &self,
        actor: &Actor,
        upload_id: &str,
        index: u32,
        data: &[u8],
    ) -> Result<(), VaultError> {
        self.recheck_guest(actor, Operation::Upload).await?;
        let max_chunk = self.runtime.read().await.max_chunk_size_bytes();
        self.uploads
            .save_chunk(&actor.key(), upload_id, index, data, max_chunk)
            .await
    }

    pub async fn finalize_upload(
        &self,
        actor: &Actor,
        upload_id: &str,
    ) -> Result<CompletedUpload, VaultError> {
        self.recheck_guest(actor, Operation::Upload).await?;
        let max_size = self.runtime.read().await.max_upload_size_bytes();
        let done = self.uploads.finalize(&actor.key(), upload_id, max_size).await?;
        info!("{} upload: {} ({} bytes)", actor, done.path, done.size);
        Ok(done)
    }

    pub async fn cancel_upload(&self, actor: &Actor, upload_id: &str) -> Result<(), VaultError> {
        self.uploads.cancel(&actor.key(), upload_id).await
    }

    /// Chunk indices received so far, so an interrupted client can resume.
    pub async fn upload_status(&self, actor: &Actor, upload_id: &str) -> Result<Vec<u32>, VaultError> {
        self.recheck_guest(actor, Operation::Upload).await?;
        self.uploads.received(&actor.key(), upload_id).await
    }

    // ═══ ARCHIVES ═══

    /// Writes every path into one zip archive on `writer`.
    ///
    /// Paths that fail to resolve or read are skipped and counted.
    pub async fn download_zip<W>(
        &self,
        actor: &Actor,
        paths: &[String],
        writer: W,
    ) -> Result<(W, ArchiveSummary), VaultError>
    where
        W: Write + Seek + Send + 'static,
    {
        if paths.is_empty() {
            return Err(VaultError::InvalidPath("No paths to archive".into()));
        }

        let mut items = Vec::with_capacity(paths.len());
        let mut rejected = 0;
        for path in paths {
            match self.target(actor, path, Operation::Download).await {
                Ok(item) => items.push(item),
                Err(e) => {
                    debug!("Leaving {:?} out of archive: {}", path, e);
                    rejected += 1;
                }
            }
        }

        let (writer, mut summary) = blocking(move || write_archive(&items, writer)).await?;
        summary.skipped += rejected;
        info!(
            "{} zip download: {} files, {} skipped",
            actor, summary.files_added, summary.skipped
        );
        Ok((writer, summary))
    }

    // ═══ SHARES ═══

    /// Shares an existing file or directory the identity controls.
    pub async fn create_share(
        &self,
        identity: &Identity,
        path: &str,
        permission: Permission,
        expires_at: Option<i64>,
    ) -> Result<Share, VaultError> {
        let target = self.resolve_for(identity, path)?;

        let metadata = match tokio::fs::metadata(target.as_path()).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(target.logical()));
            }
            Err(e) => return Err(VaultError::Io(e)),
        };
        authorize_share_creation(identity, &target, permission, metadata.is_dir())?;

        let owner = match target.scope() {
            Scope::Private => Some(identity.name()),
            Scope::Shared => None,
        };
        let share = self
            .shares
            .create(&target.relative(), target.scope(), owner, permission, expires_at)
            .await?;
        log_operation(identity.name(), "share", target.as_path());
        Ok(share)
    }

    /// Public metadata of a live share.
    pub async fn share_info(&self, share_id: &str) -> Result<Share, VaultError> {
        self.active_share(share_id).await
    }

    /// Live shares in `scope` visible to the identity, optionally for one target.
    pub async fn list_shares(
        &self,
        identity: &Identity,
        scope: Scope,
        path: Option<&str>,
    ) -> Result<Vec<Share>, VaultError> {
        let filter = match path {
            Some(path) => {
                let logical = format!("{}/{}", scope.as_str(), path);
                Some(self.resolve_for(identity, &logical)?.relative())
            }
            None => None,
        };
        self.shares
            .list_for(identity.name(), scope, filter.as_deref())
            .await
    }

    /// Removes a share. Returns false when no such share exists.
    pub async fn delete_share(&self, identity: &Identity, share_id: &str) -> Result<bool, VaultError> {
        let Some(share) = self.shares.get(share_id).await? else {
            return Ok(false);
        };
        authorize_share_removal(identity, &share)?;
        self.shares.delete(share_id, identity.name()).await
    }

    // ═══ RESOLUTION ═══

    /// Resolves and authorizes one logical path for `actor`.
    async fn target(
        &self,
        actor: &Actor,
        path: &str,
        operation: Operation,
    ) -> Result<ResolvedPath, VaultError> {
        let result = match actor {
            Actor::Identity(identity) => self.resolve_for(identity, path).and_then(|target| {
                authorize_identity(identity, &target, operation)?;
                Ok(target)
            }),
            Actor::Guest { share_id } => self.guest_target(share_id, path, operation).await,
        };

        if let Err(e) = &result {
            if matches!(e.kind(), ErrorKind::PathTraversal | ErrorKind::InvalidPath) {
                log_rejected_path(&actor.to_string(), path, &e.to_string());
            }
        }
        result
    }

    fn resolve_for(&self, identity: &Identity, path: &str) -> Result<ResolvedPath, VaultError> {
        self.resolver.resolve(path, Some(identity))
    }

    async fn new_entry(
        &self,
        actor: &Actor,
        dir: &str,
        name: &str,
        operation: Operation,
    ) -> Result<ResolvedPath, VaultError> {
        let dir = self.target(actor, dir, operation).await?;
        dir.child(name).inspect_err(|e| {
            log_rejected_path(&actor.to_string(), name, &e.to_string());
        })
    }

    async fn guest_target(
        &self,
        share_id: &str,
        path: &str,
        operation: Operation,
    ) -> Result<ResolvedPath, VaultError> {
        let share = self.active_share(share_id).await?;
        authorize_guest(&share, operation)?;

        let root = self
            .resolver
            .resolve_share_target(share.storage_type, share.username.as_deref(), &share.path)?
            .as_confinement_root();
        let shares_file = match tokio::fs::metadata(root.as_path()).await {
            Ok(metadata) => metadata.is_file(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(format!("share {share_id} target")));
            }
            Err(e) => return Err(VaultError::Io(e)),
        };
        if !shares_file {
            return self.resolver.resolve_within(path, &root);
        }

        // A file share reaches exactly one file, and only for download.
        let only_download = || {
            VaultError::Forbidden(format!("Share {share_id} only allows downloading its file"))
        };
        if operation != Operation::Download {
            return Err(only_download());
        }
        match self.resolver.resolve_within(path, &root) {
            Ok(target) if target.is_root() => Ok(target),
            Err(e) if matches!(e.kind(), ErrorKind::PathTraversal | ErrorKind::InvalidPath) => Err(e),
            _ => Err(only_download()),
        }
    }

    async fn active_share(&self, share_id: &str) -> Result<Share, VaultError> {
        self.shares
            .get(share_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("share {share_id}")))
    }

    /// A guest's share may expire or be deleted while an upload is in flight.
    async fn recheck_guest(&self, actor: &Actor, operation: Operation) -> Result<(), VaultError> {
        if let Actor::Guest { share_id } = actor {
            let share = self.active_share(share_id).await?;
            authorize_guest(&share, operation)?;
        }
        Ok(())
    }
}
