//! Recursive traversal: hierarchy snapshots and name search.

use log::debug;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::VaultError;
use crate::storage::filesystem::ensure_directory;
use crate::storage::resolver::ResolvedPath;
use crate::storage::results::{SearchHit, TreeNode, listing_order, size_and_mtime};

/// Builds an owned tree rooted at `dir`.
///
/// Subdirectories that cannot be read come back with no children instead of
/// failing the whole traversal. Links are reported as leaves.
pub fn build_hierarchy(dir: &ResolvedPath) -> Result<TreeNode, VaultError> {
    ensure_directory(dir)?;
    let metadata = fs::metadata(dir.as_path())?;
    let (size, mtime) = size_and_mtime(&metadata);

    Ok(TreeNode {
        name: dir.name(),
        path: dir.logical(),
        is_dir: true,
        size,
        mtime,
        children: children_of(dir, dir.as_path()),
    })
}

fn children_of(base: &ResolvedPath, path: &Path) -> Vec<TreeNode> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Unreadable directory {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut nodes: Vec<TreeNode> = entries
        .flatten()
        .filter_map(|entry| {
            let entry_path = entry.path();
            let metadata = entry_path.symlink_metadata().ok()?;
            let (size, mtime) = size_and_mtime(&metadata);
            let is_dir = metadata.is_dir();
            let children = if is_dir {
                children_of(base, &entry_path)
            } else {
                Vec::new()
            };

            Some(TreeNode {
                name: entry.file_name().to_string_lossy().to_string(),
                path: base.logical_for(&entry_path),
                is_dir,
                size,
                mtime,
                children,
            })
        })
        .collect();

    nodes.sort_by(|a, b| listing_order(a.is_dir, &a.name, b.is_dir, &b.name));
    nodes
}

/// Case-insensitive substring search on entry names below `dir`.
pub fn search(dir: &ResolvedPath, query: &str) -> Result<Vec<SearchHit>, VaultError> {
    ensure_directory(dir)?;

    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Err(VaultError::InvalidPath("Search query cannot be empty".into()));
    }

    let mut hits: Vec<SearchHit> = WalkDir::new(dir.as_path())
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        // Unreadable subtrees are skipped, same as the hierarchy.
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .contains(&needle)
        })
        .filter_map(|entry| {
            let metadata = entry.path().symlink_metadata().ok()?;
            let (size, mtime) = size_and_mtime(&metadata);
            Some(SearchHit {
                name: entry.file_name().to_string_lossy().to_string(),
                path: dir.logical_for(entry.path()),
                is_dir: metadata.is_dir(),
                size,
                mtime,
            })
        })
        .collect();

    hits.sort_by(|a, b| listing_order(a.is_dir, &a.name, b.is_dir, &b.name));
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StartupConfig;
    use crate::storage::{PathResolver, StorageRoots};
    use tempfile::TempDir;

    fn shared_root() -> (TempDir, ResolvedPath) {
        let dir = TempDir::new().unwrap();
        let config = StartupConfig {
            root_dir: dir.path().to_string_lossy().to_string(),
            shared_dir: "shared".into(),
            users_dir: "users".into(),
            shares_file: None,
            uploads_dir: None,
            jwt_secret: "secret".into(),
            legacy_unscoped_paths: false,
            welcome_message: None,
            users: Vec::new(),
        };
        let resolver = PathResolver::new(StorageRoots::prepare(&config).unwrap(), false);
        let shared = resolver.resolve("shared", None).unwrap();
        (dir, shared)
    }

    #[test]
    fn hierarchy_sorts_directories_first_case_insensitively() {
        let (_dir, shared) = shared_root();
        let root = shared.as_path();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("A.txt"), "a").unwrap();
        fs::create_dir_all(root.join("zeta/inner")).unwrap();
        fs::create_dir(root.join("Alpha")).unwrap();
        fs::write(root.join("zeta/inner/deep.md"), "deep").unwrap();

        let tree = build_hierarchy(&shared).unwrap();
        let names: Vec<_> = tree.children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta", "A.txt", "b.txt"]);
        assert_eq!(tree.path, "shared");

        let deep = &tree.children[1].children[0].children[0];
        assert_eq!(deep.name, "deep.md");
        assert_eq!(deep.path, "shared/zeta/inner/deep.md");
        assert_eq!(deep.size, 4);
    }

    #[test]
    fn search_matches_names_case_insensitively() {
        let (_dir, shared) = shared_root();
        let root = shared.as_path();
        fs::create_dir_all(root.join("Reports/2024")).unwrap();
        fs::write(root.join("Reports/2024/annual-REPORT.pdf"), "x").unwrap();
        fs::write(root.join("notes.txt"), "x").unwrap();

        let hits = search(&shared, "report").unwrap();
        let paths: Vec<_> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["shared/Reports", "shared/Reports/2024/annual-REPORT.pdf"]);

        assert!(search(&shared, "   ").is_err());
    }
}
