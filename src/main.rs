//! Vault server - Entry Point
//!
//! Loads configuration, prepares the storage layout and reports what the
//! vault will serve. `vault-server hash-password <secret>` prints a password
//! hash for the `users` table in config.toml.

use log::{error, info};
use std::process::ExitCode;

use vault_server::auth::hash_password;
use vault_server::error::handlers::handle_error;
use vault_server::{Vault, VaultConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [command, secret] if command == "hash-password" => print_hash(secret),
        [] => bootstrap().await,
        _ => {
            eprintln!("usage: vault-server [hash-password <secret>]");
            ExitCode::FAILURE
        }
    }
}

fn print_hash(secret: &str) -> ExitCode {
    match hash_password(secret) {
        Ok(hash) => {
            println!("{hash}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to hash password: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn bootstrap() -> ExitCode {
    info!("Launching vault server...");

    let config = match VaultConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let vault = match Vault::new(config) {
        Ok(vault) => vault,
        Err(e) => {
            handle_error(&e);
            error!("Failed to prepare storage");
            return ExitCode::FAILURE;
        }
    };

    let runtime = vault.runtime();
    let runtime = runtime.read().await;
    info!(
        "Storage ready at {} for {} users (uploads up to {} MB, {} login attempts per {}s)",
        vault.resolver().roots().global().display(),
        vault.registry().len(),
        runtime.max_upload_size_mb,
        runtime.max_login_attempts,
        runtime.login_window_secs
    );

    ExitCode::SUCCESS
}
