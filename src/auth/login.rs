//! Login flow
//!
//! Combines the identity registry, the failed-attempt limiter and the token
//! service into the username + secret -> token contract.

use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::credentials::{Identity, IdentityRegistry};
use crate::auth::token::TokenService;
use crate::config::SharedRuntimeConfig;
use crate::error::VaultError;
use crate::middleware::RateLimiter;

pub struct LoginService {
    registry: Arc<IdentityRegistry>,
    tokens: TokenService,
    limiter: Mutex<RateLimiter>,
    runtime: SharedRuntimeConfig,
}

impl LoginService {
    pub fn new(registry: Arc<IdentityRegistry>, tokens: TokenService, runtime: SharedRuntimeConfig) -> Self {
        Self {
            registry,
            tokens,
            // Limits are refreshed from runtime config on every attempt.
            limiter: Mutex::new(RateLimiter::new(1, std::time::Duration::ZERO)),
            runtime,
        }
    }

    /// Verifies credentials and issues a signed identity token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, VaultError> {
        let (max_failures, window) = {
            let runtime = self.runtime.read().await;
            (runtime.max_login_attempts, runtime.login_window())
        };

        {
            let mut limiter = self.limiter.lock().await;
            limiter.set_limits(max_failures, window);
            if !limiter.is_allowed(username) {
                warn!("Login throttled for user {}", username);
                return Err(VaultError::RateLimited(username.to_string()));
            }
            // Counted up front so in-flight attempts occupy their slot;
            // a successful login clears it again.
            limiter.record_failure(username);
        }

        // Argon2 is CPU bound; keep it off the async workers.
        let registry = Arc::clone(&self.registry);
        let (name, secret) = (username.to_string(), password.to_string());
        let verified = tokio::task::spawn_blocking(move || registry.verify(&name, &secret))
            .await
            .map_err(|e| VaultError::Internal(format!("credential check aborted: {e}")))?;

        let mut limiter = self.limiter.lock().await;
        match verified {
            Some(identity) => {
                limiter.reset(username);
                drop(limiter);
                info!("User {} logged in", identity.name());
                self.tokens.issue(&identity)
            }
            None => {
                drop(limiter);
                warn!("Failed login for user {}", username);
                Err(VaultError::AuthorizationRequired(
                    "Invalid username or password".into(),
                ))
            }
        }
    }

    /// Maps a token back to a currently registered identity.
    pub fn authenticate(&self, token: &str) -> Result<Identity, VaultError> {
        let username = self.tokens.validate(token)?;
        self.registry
            .get(&username)
            .cloned()
            .ok_or_else(|| VaultError::AuthorizationRequired("Unknown user".into()))
    }
}
