//! Startup state
//!
//! Creates the on-disk layout before the vault serves anything: storage
//! roots, one private root per registered identity, the share table
//! directory and the upload scratch area.

use log::{info, warn};
use std::fs;
use std::io;

use crate::auth::IdentityRegistry;
use crate::config::StartupConfig;
use crate::storage::StorageRoots;

pub fn prepare_layout(
    config: &StartupConfig,
    registry: &IdentityRegistry,
) -> io::Result<StorageRoots> {
    let roots = StorageRoots::prepare(config)?;
    info!("Global root: {}", roots.global().display());
    info!("Shared root: {}", roots.shared().display());

    let welcome = config.welcome_message.as_deref();
    for identity in registry.identities() {
        let root = roots.ensure_private_root(identity.name(), welcome)?;
        info!("Private root for {}: {}", identity.name(), root.display());
    }

    if let Some(parent) = config.shares_file_path().parent() {
        fs::create_dir_all(parent)?;
    }

    // Sessions live in memory only, so anything left here belongs to a previous run.
    let uploads = config.uploads_dir_path();
    match fs::remove_dir_all(&uploads) {
        Ok(()) => info!("Cleared stale upload scratch in {}", uploads.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not clear upload scratch {}: {}", uploads.display(), e),
    }
    fs::create_dir_all(&uploads)?;

    Ok(roots)
}
