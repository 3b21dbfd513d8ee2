pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod server;
pub mod shares;
pub mod storage;
pub mod transfer;

pub use access::Actor;
pub use auth::Identity;
pub use config::VaultConfig;
pub use error::VaultError;
pub use server::Vault;
