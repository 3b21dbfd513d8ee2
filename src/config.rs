//! Configuration management for the vault server
//!
//! Separates startup configuration (requires restart) from runtime configuration
//! (can be updated while the service is running).

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Complete server configuration with startup/runtime separation
#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    #[serde(flatten)]
    pub startup: StartupConfig,

    #[serde(flatten)]
    pub runtime: RuntimeConfig,
}

/// A registered identity as written in the configuration file.
#[derive(Debug, Deserialize, Clone)]
pub struct UserEntry {
    pub username: String,

    /// Argon2 PHC string, see [`crate::auth::hash_password`]
    pub password_hash: String,

    #[serde(default)]
    pub can_write_shared: bool,
}

/// Configuration that requires a restart to take effect
#[derive(Debug, Deserialize, Clone)]
pub struct StartupConfig {
    // ═══ STORAGE LAYOUT ═══
    /// Global storage root
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// Shared area, relative to the global root
    #[serde(default = "default_shared_dir")]
    pub shared_dir: String,

    /// Parent of every private root, relative to the global root
    #[serde(default = "default_users_dir")]
    pub users_dir: String,

    /// Share table file. Defaults to `<root>/.vault/shares.json`
    #[serde(default)]
    pub shares_file: Option<String>,

    /// Scratch space for chunked uploads. Defaults to `<root>/.vault/uploads`
    #[serde(default)]
    pub uploads_dir: Option<String>,

    // ═══ SECURITY ═══
    /// HMAC secret for identity tokens
    pub jwt_secret: String,

    /// Route paths without a `shared/` or `private/` prefix to the shared area
    #[serde(default = "default_legacy_unscoped_paths")]
    pub legacy_unscoped_paths: bool,

    /// Content of `welcome.txt` placed in new private roots
    #[serde(default)]
    pub welcome_message: Option<String>,

    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// Configuration that can be updated at runtime
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Failed logins allowed per user inside the window
    /// Environment: VAULT__MAX_LOGIN_ATTEMPTS
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: usize,

    #[serde(default = "default_login_window_secs")]
    pub login_window_secs: u64,

    /// Per-file limit for single-shot uploads and assembled chunked uploads
    #[serde(default = "default_max_upload_size_mb")]
    pub max_upload_size_mb: u64,

    #[serde(default = "default_max_chunk_size_mb")]
    pub max_chunk_size_mb: u64,

    /// Chunked uploads without activity for this long are discarded
    #[serde(default = "default_upload_idle_secs")]
    pub upload_idle_secs: u64,
}

/// Thread-safe runtime configuration wrapper
pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

fn default_root_dir() -> String {
    "/srv/files".to_string()
}

fn default_shared_dir() -> String {
    "shared".to_string()
}

fn default_users_dir() -> String {
    "users".to_string()
}

fn default_legacy_unscoped_paths() -> bool {
    true
}

fn default_max_login_attempts() -> usize {
    5
}

fn default_login_window_secs() -> u64 {
    3600
}

fn default_max_upload_size_mb() -> u64 {
    1024
}

fn default_max_chunk_size_mb() -> u64 {
    64
}

fn default_upload_idle_secs() -> u64 {
    24 * 3600
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: default_max_login_attempts(),
            login_window_secs: default_login_window_secs(),
            max_upload_size_mb: default_max_upload_size_mb(),
            max_chunk_size_mb: default_max_chunk_size_mb(),
            upload_idle_secs: default_upload_idle_secs(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_paths = ["vault-server/config", "config"];

        let mut last_error = None;

        for config_path in &config_paths {
            match Self::build(File::with_name(config_path)) {
                Ok(config) => return Ok(config),
                Err(e) => last_error = Some(e),
            }
        }

        Err(config::ConfigError::Message(format!(
            "Failed to load config.toml from any location. Tried: {config_paths:?}. Last error: {last_error:?}"
        )))
    }

    /// Load configuration from an explicit file with environment overrides
    pub fn from_file(path: &Path) -> Result<Self, config::ConfigError> {
        Self::build(File::from(path))
    }

    fn build<T>(file: T) -> Result<Self, config::ConfigError>
    where
        T: config::Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("VAULT").separator("__"))
            .build()?;
        let config: VaultConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Split into startup (immutable) and runtime (mutable) parts
    pub fn split(self) -> (StartupConfig, SharedRuntimeConfig) {
        let runtime = Arc::new(RwLock::new(self.runtime));
        (self.startup, runtime)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let startup = &self.startup;

        if startup.root_dir.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "root_dir cannot be empty".into(),
            ));
        }

        for (name, dir) in [("shared_dir", &startup.shared_dir), ("users_dir", &startup.users_dir)] {
            if !is_single_component(dir) {
                return Err(config::ConfigError::Message(format!(
                    "{name} must be a single directory name, got {dir:?}"
                )));
            }
        }

        if startup.shared_dir == startup.users_dir {
            return Err(config::ConfigError::Message(
                "shared_dir and users_dir must differ".into(),
            ));
        }

        if startup.jwt_secret.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "jwt_secret cannot be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for user in &startup.users {
            if !is_valid_username(&user.username) {
                return Err(config::ConfigError::Message(format!(
                    "Invalid username: {:?}",
                    user.username
                )));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(config::ConfigError::Message(format!(
                    "Duplicate username: {}",
                    user.username
                )));
            }
        }

        if self.runtime.max_login_attempts == 0 {
            return Err(config::ConfigError::Message(
                "max_login_attempts must be greater than 0".into(),
            ));
        }

        if self.runtime.login_window_secs == 0 {
            return Err(config::ConfigError::Message(
                "login_window_secs must be greater than 0".into(),
            ));
        }

        if self.runtime.max_upload_size_mb == 0 || self.runtime.max_chunk_size_mb == 0 {
            return Err(config::ConfigError::Message(
                "upload size limits must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Usernames name a private root directory, so they must be a plain path component.
pub fn is_valid_username(username: &str) -> bool {
    is_single_component(username)
        && username.len() <= 64
        && !username.contains(['@', '#', ',', '%'])
        && !username.chars().any(char::is_whitespace)
}

fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}

impl StartupConfig {
    /// Get the global root as PathBuf
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root_dir)
    }

    fn state_dir(&self) -> PathBuf {
        self.root_path().join(".vault")
    }

    pub fn shares_file_path(&self) -> PathBuf {
        match &self.shares_file {
            Some(path) => PathBuf::from(path),
            None => self.state_dir().join("shares.json"),
        }
    }

    pub fn uploads_dir_path(&self) -> PathBuf {
        match &self.uploads_dir {
            Some(path) => PathBuf::from(path),
            None => self.state_dir().join("uploads"),
        }
    }
}

impl RuntimeConfig {
    /// Get maximum file size in bytes
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    pub fn max_chunk_size_bytes(&self) -> u64 {
        self.max_chunk_size_mb * 1024 * 1024
    }

    pub fn login_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.login_window_secs)
    }

    pub fn upload_idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upload_idle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_defaults_and_users() {
        let file = write_config(
            r#"
            root_dir = "/tmp/vault"
            jwt_secret = "secret"

            [[users]]
            username = "alice"
            password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"

            [[users]]
            username = "root-writer"
            password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"
            can_write_shared = true
            "#,
        );

        let config = VaultConfig::from_file(file.path()).unwrap();
        assert_eq!(config.startup.shared_dir, "shared");
        assert_eq!(config.startup.users.len(), 2);
        assert!(!config.startup.users[0].can_write_shared);
        assert!(config.startup.users[1].can_write_shared);
        assert_eq!(config.runtime.max_login_attempts, 5);
        assert_eq!(
            config.startup.shares_file_path(),
            PathBuf::from("/tmp/vault/.vault/shares.json")
        );
    }

    #[test]
    fn rejects_duplicate_and_unsafe_usernames() {
        let duplicate = write_config(
            r#"
            jwt_secret = "secret"
            [[users]]
            username = "bob"
            password_hash = "x"
            [[users]]
            username = "bob"
            password_hash = "y"
            "#,
        );
        assert!(VaultConfig::from_file(duplicate.path()).is_err());

        let traversal = write_config(
            r#"
            jwt_secret = "secret"
            [[users]]
            username = ".."
            password_hash = "x"
            "#,
        );
        assert!(VaultConfig::from_file(traversal.path()).is_err());
    }

    #[test]
    fn rejects_empty_secret() {
        let file = write_config("jwt_secret = \"  \"\n");
        assert!(VaultConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn username_rules() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("root-writer"));
        assert!(!is_valid_username("a/b"));
        assert!(!is_valid_username("."));
        assert!(!is_valid_username("bad name"));
        assert!(!is_valid_username(""));
    }
}
