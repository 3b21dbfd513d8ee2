//! Credential storage and management
//!
//! The identity registry is built once from configuration and shared
//! read-only between request handlers.

use log::warn;
use std::collections::HashMap;

use crate::auth::validator::{hash_password, verify_password};
use crate::config::{UserEntry, is_valid_username};

/// An authenticated user as seen by the rest of the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    can_write_shared: bool,
}

impl Identity {
    pub fn new(name: impl Into<String>, can_write_shared: bool) -> Self {
        Self {
            name: name.into(),
            can_write_shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this identity may create, modify or delete entries in the shared area.
    pub fn can_write_shared(&self) -> bool {
        self.can_write_shared
    }
}

struct Credential {
    identity: Identity,
    password_hash: String,
}

/// Process-wide, immutable table of known identities.
pub struct IdentityRegistry {
    users: HashMap<String, Credential>,
    // Verified against for unknown usernames so both paths cost one Argon2 run.
    decoy_hash: Option<String>,
}

impl IdentityRegistry {
    pub fn from_entries(entries: &[UserEntry]) -> Self {
        let mut users = HashMap::new();
        for entry in entries {
            if !is_valid_username(&entry.username) {
                warn!("Skipping user with invalid name: {:?}", entry.username);
                continue;
            }
            users.insert(
                entry.username.clone(),
                Credential {
                    identity: Identity::new(entry.username.clone(), entry.can_write_shared),
                    password_hash: entry.password_hash.clone(),
                },
            );
        }

        let decoy_hash = hash_password("decoy-credential-never-valid").ok();

        Self { users, decoy_hash }
    }

    /// Looks up an identity by name.
    pub fn get(&self, username: &str) -> Option<&Identity> {
        self.users.get(username).map(|c| &c.identity)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.users.values().map(|c| &c.identity)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Checks a username/secret pair. Unknown users cost the same as a wrong secret.
    pub fn verify(&self, username: &str, password: &str) -> Option<Identity> {
        match self.users.get(username) {
            Some(credential) => {
                verify_password(password, &credential.password_hash)
                    .then(|| credential.identity.clone())
            }
            None => {
                if let Some(decoy) = &self.decoy_hash {
                    let _ = verify_password(password, decoy);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, hash: &str, writer: bool) -> UserEntry {
        UserEntry {
            username: name.to_string(),
            password_hash: hash.to_string(),
            can_write_shared: writer,
        }
    }

    #[test]
    fn verifies_known_users_only() {
        let hash = hash_password("alice123").unwrap();
        let registry = IdentityRegistry::from_entries(&[
            entry("alice", &hash, false),
            entry("root-writer", &hash, true),
        ]);

        let alice = registry.verify("alice", "alice123").unwrap();
        assert_eq!(alice.name(), "alice");
        assert!(!alice.can_write_shared());
        assert!(registry.verify("alice", "wrong").is_none());
        assert!(registry.verify("mallory", "alice123").is_none());
        assert!(registry.get("root-writer").unwrap().can_write_shared());
    }

    #[test]
    fn skips_unsafe_names() {
        let registry = IdentityRegistry::from_entries(&[entry("../etc", "x", true)]);
        assert!(registry.is_empty());
    }
}
