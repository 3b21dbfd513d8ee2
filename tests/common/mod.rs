#![allow(dead_code)]

use std::sync::OnceLock;
use tempfile::TempDir;

use vault_server::auth::hash_password;
use vault_server::config::{RuntimeConfig, StartupConfig, UserEntry};
use vault_server::{Actor, Identity, Vault, VaultConfig};

pub const PASSWORD: &str = "correct horse";

fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap())
}

fn user(name: &str, can_write_shared: bool) -> UserEntry {
    UserEntry {
        username: name.to_string(),
        password_hash: password_hash().to_string(),
        can_write_shared,
    }
}

pub struct TestVault {
    pub dir: TempDir,
    pub vault: Vault,
}

impl TestVault {
    pub fn new() -> Self {
        Self::with_runtime(RuntimeConfig::default())
    }

    pub fn with_runtime(runtime: RuntimeConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let config = VaultConfig {
            startup: StartupConfig {
                root_dir: dir.path().to_string_lossy().to_string(),
                shared_dir: "shared".into(),
                users_dir: "users".into(),
                shares_file: None,
                uploads_dir: None,
                jwt_secret: "integration-secret".into(),
                legacy_unscoped_paths: true,
                welcome_message: Some("Welcome to your vault".into()),
                users: vec![
                    user("alice", false),
                    user("bob", false),
                    user("root-writer", true),
                ],
            },
            runtime,
        };
        let vault = Vault::new(config).unwrap();
        Self { dir, vault }
    }

    pub fn identity(&self, name: &str) -> Identity {
        self.vault.registry().get(name).cloned().unwrap()
    }

    pub fn actor(&self, name: &str) -> Actor {
        Actor::Identity(self.identity(name))
    }

    pub fn shared_root(&self) -> std::path::PathBuf {
        self.vault.resolver().roots().shared().to_path_buf()
    }

    pub fn private_root(&self, name: &str) -> std::path::PathBuf {
        self.vault.resolver().roots().private_root(name)
    }
}
