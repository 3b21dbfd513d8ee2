//! Storage roots
//!
//! The global, shared and per-identity private roots. Computed and
//! canonicalized once at startup, never changed afterwards.

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::StartupConfig;

/// Which storage area a logical path selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Shared,
    Private,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Shared => "shared",
            Scope::Private => "private",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StorageRoots {
    global: PathBuf,
    shared: PathBuf,
    users: PathBuf,
    users_dir_name: String,
}

impl StorageRoots {
    /// Creates the root directories if needed and canonicalizes them.
    pub fn prepare(config: &StartupConfig) -> io::Result<Self> {
        let global = config.root_path();
        fs::create_dir_all(&global)?;
        let global = global.canonicalize()?;

        let shared = global.join(&config.shared_dir);
        fs::create_dir_all(&shared)?;
        let shared = shared.canonicalize()?;

        let users = global.join(&config.users_dir);
        fs::create_dir_all(&users)?;
        let users = users.canonicalize()?;

        for (name, dir) in [("shared", &shared), ("users", &users)] {
            if !dir.starts_with(&global) || dir == &global {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{name} root {} is not inside {}", dir.display(), global.display()),
                ));
            }
        }

        info!(
            "Storage roots: global={}, shared={}, users={}",
            global.display(),
            shared.display(),
            users.display()
        );

        Ok(Self {
            global,
            shared,
            users,
            users_dir_name: config.users_dir.clone(),
        })
    }

    pub fn global(&self) -> &Path {
        &self.global
    }

    pub fn shared(&self) -> &Path {
        &self.shared
    }

    pub fn users(&self) -> &Path {
        &self.users
    }

    /// Name of the users area directory, as it appears under the global root.
    pub fn users_dir_name(&self) -> &str {
        &self.users_dir_name
    }

    /// Private root of an already-authenticated identity.
    pub fn private_root(&self, identity: &str) -> PathBuf {
        self.users.join(identity)
    }

    /// Creates a private root, seeding it with a welcome file the first time.
    pub fn ensure_private_root(&self, identity: &str, welcome: Option<&str>) -> io::Result<PathBuf> {
        let root = self.private_root(identity);
        if !root.exists() {
            fs::create_dir_all(&root)?;
            info!("Created private storage for {}", identity);
        }

        if let Some(message) = welcome {
            let welcome_file = root.join("welcome.txt");
            if !welcome_file.exists() {
                fs::write(&welcome_file, message)?;
            }
        }

        Ok(root)
    }
}
