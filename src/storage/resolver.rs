//! Path resolution
//!
//! Maps untrusted logical paths onto absolute filesystem paths confined to a
//! storage root. Every filesystem operation receives a [`ResolvedPath`], and
//! the only way to obtain one is through this module.
//!
//! Resolution order:
//! 1. null bytes are rejected
//! 2. `..` segments are rejected on the logical input, before any prefix or
//!    filesystem interpretation
//! 3. absolute inputs are rejected
//! 4. the scope prefix selects the base root
//! 5. the remainder is joined, canonicalized, and checked to still be inside
//!    the base root

use log::warn;
use std::io;
use std::path::{Path, PathBuf};

use crate::auth::Identity;
use crate::error::VaultError;
use crate::storage::roots::{Scope, StorageRoots};
use crate::storage::validation::{
    collapse, reject_absolute, reject_null, reject_traversal, segments, unify_separators,
    validate_entry_name,
};

/// An absolute, canonical path proven to lie inside `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    root: PathBuf,
    scope: Scope,
    // Logical prefix used when rendering descendants back to callers.
    prefix: String,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// The boundary this path is confined to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_root(&self) -> bool {
        self.path == self.root
    }

    /// Final component, or the scope name for a scope root.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.scope.as_str().to_string())
    }

    /// `/`-separated path of this entry relative to its root.
    pub fn relative(&self) -> String {
        relative_to(&self.root, &self.path)
    }

    /// The logical path a caller would submit to reach this entry again.
    pub fn logical(&self) -> String {
        self.logical_for(&self.path)
    }

    /// Logical path of a descendant discovered by traversal.
    pub fn logical_for(&self, path: &Path) -> String {
        let relative = relative_to(&self.root, path);
        match (self.prefix.is_empty(), relative.is_empty()) {
            (true, _) => relative,
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, relative),
        }
    }

    /// Resolves a single new entry name directly under this directory.
    pub fn child(&self, name: &str) -> Result<ResolvedPath, VaultError> {
        let name = validate_entry_name(name)?;
        let path = confine(&self.path.join(name), &self.root, name)?;
        Ok(self.with_path(path))
    }

    /// Parent directory, unless this is already the root.
    pub fn parent(&self) -> Option<ResolvedPath> {
        if self.is_root() {
            return None;
        }
        self.path.parent().map(|p| self.with_path(p.to_path_buf()))
    }

    /// Re-checks containment against the current filesystem state.
    ///
    /// Called before every mutation: a path resolved earlier may since have
    /// been swapped for a link pointing elsewhere.
    pub fn reverify(&self) -> Result<(), VaultError> {
        confine(&self.path, &self.root, &self.relative()).map(|_| ())
    }

    /// Treats this path as the boundary for further resolution (guest access).
    pub fn as_confinement_root(&self) -> ResolvedPath {
        ResolvedPath {
            path: self.path.clone(),
            root: self.path.clone(),
            scope: self.scope,
            prefix: String::new(),
        }
    }

    fn with_path(&self, path: PathBuf) -> ResolvedPath {
        ResolvedPath {
            path,
            root: self.root.clone(),
            scope: self.scope,
            prefix: self.prefix.clone(),
        }
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// Canonicalizes the longest existing ancestor and re-appends the rest, so
/// not-yet-created targets resolve too.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut canonical) => {
                for component in tail.iter().rev() {
                    canonical.push(component);
                }
                return Ok(canonical);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let Some(name) = existing.file_name().map(|n| n.to_os_string()) else {
                    return Err(e);
                };
                tail.push(name);
                if !existing.pop() {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Canonicalizes `candidate` and proves it equals `root` or lies beneath it.
fn confine(candidate: &Path, root: &Path, input: &str) -> Result<PathBuf, VaultError> {
    let canonical = canonicalize_lenient(candidate).map_err(|e| match e.kind() {
        io::ErrorKind::NotADirectory => VaultError::NotADirectory(input.to_string()),
        _ => VaultError::Io(e),
    })?;

    if canonical.starts_with(root) {
        Ok(canonical)
    } else {
        warn!(
            "Resolved path {} escapes root {}",
            canonical.display(),
            root.display()
        );
        Err(VaultError::PathTraversal(input.to_string()))
    }
}

pub struct PathResolver {
    roots: StorageRoots,
    legacy_unscoped_paths: bool,
}

impl PathResolver {
    pub fn new(roots: StorageRoots, legacy_unscoped_paths: bool) -> Self {
        Self {
            roots,
            legacy_unscoped_paths,
        }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    /// Resolves a scope-prefixed logical path for an authenticated caller.
    pub fn resolve(
        &self,
        logical_path: &str,
        identity: Option<&Identity>,
    ) -> Result<ResolvedPath, VaultError> {
        reject_null(logical_path)?;
        let unified = unify_separators(logical_path);
        reject_traversal(logical_path, &unified)?;
        reject_absolute(logical_path, &unified)?;
        let normalized = collapse(&unified);

        let (scope, rest) = if let Some(rest) = strip_scope(&normalized, "shared") {
            (Scope::Shared, rest)
        } else if let Some(rest) = strip_scope(&normalized, "private") {
            (Scope::Private, rest)
        } else if self.legacy_unscoped_paths {
            warn!(
                "Deprecated unscoped path {:?}, routing to shared storage",
                logical_path
            );
            (Scope::Shared, normalized.as_str())
        } else {
            return Err(VaultError::InvalidPath(format!(
                "Path must start with shared/ or private/: {logical_path}"
            )));
        };

        let mut parts = segments(rest);

        let (base, prefix) = match scope {
            Scope::Shared => (self.roots.shared().to_path_buf(), "shared"),
            Scope::Private => {
                let identity = identity.ok_or_else(|| {
                    VaultError::AuthorizationRequired("Private storage requires login".into())
                })?;
                // Listings rooted at the global root come back as users/<name>/...
                if parts.len() >= 2
                    && parts[0] == self.roots.users_dir_name()
                    && parts[1] == identity.name()
                {
                    parts.drain(..2);
                }
                (self.private_base(identity.name())?, "private")
            }
        };

        join_confined(base, &parts, scope, prefix, logical_path)
    }

    /// Resolves a logical path relative to a guest's confinement root.
    /// No scope prefix is interpreted.
    pub fn resolve_within(
        &self,
        logical_path: &str,
        confinement_root: &ResolvedPath,
    ) -> Result<ResolvedPath, VaultError> {
        reject_null(logical_path)?;
        let unified = unify_separators(logical_path);
        reject_traversal(logical_path, &unified)?;
        reject_absolute(logical_path, &unified)?;
        let normalized = collapse(&unified);

        // The root itself may have been replaced since the share was resolved.
        confinement_root.reverify()?;
        let root = confinement_root.as_confinement_root();

        join_confined(
            root.path.clone(),
            &segments(&normalized),
            root.scope,
            "",
            logical_path,
        )
    }

    /// Resolves a share's stored target path inside its scope root.
    pub fn resolve_share_target(
        &self,
        scope: Scope,
        owner: Option<&str>,
        target_path: &str,
    ) -> Result<ResolvedPath, VaultError> {
        reject_null(target_path)?;
        let unified = unify_separators(target_path);
        reject_traversal(target_path, &unified)?;
        reject_absolute(target_path, &unified)?;
        let normalized = collapse(&unified);

        let (base, prefix) = match scope {
            Scope::Shared => (self.roots.shared().to_path_buf(), "shared"),
            Scope::Private => {
                let owner = owner.ok_or_else(|| {
                    VaultError::Internal("private share without owner".into())
                })?;
                (self.private_base(owner)?, "private")
            }
        };

        join_confined(base, &segments(&normalized), scope, prefix, target_path)
    }

    fn private_base(&self, identity: &str) -> Result<PathBuf, VaultError> {
        let base = confine(
            &self.roots.private_root(identity),
            self.roots.users(),
            identity,
        )?;
        if base == self.roots.users() {
            return Err(VaultError::PathTraversal(identity.to_string()));
        }
        Ok(base)
    }
}

fn strip_scope<'a>(normalized: &'a str, scope: &str) -> Option<&'a str> {
    if normalized == scope {
        Some("")
    } else {
        normalized
            .strip_prefix(scope)
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

fn join_confined(
    base: PathBuf,
    parts: &[&str],
    scope: Scope,
    prefix: &str,
    input: &str,
) -> Result<ResolvedPath, VaultError> {
    if parts.is_empty() {
        return Ok(ResolvedPath {
            path: base.clone(),
            root: base,
            scope,
            prefix: prefix.to_string(),
        });
    }

    let mut candidate = base.clone();
    candidate.extend(parts);
    let path = confine(&candidate, &base, input)?;

    Ok(ResolvedPath {
        path,
        root: base,
        scope,
        prefix: prefix.to_string(),
    })
}
