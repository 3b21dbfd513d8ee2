mod common;

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

use common::TestVault;
use vault_server::error::ErrorKind;
use vault_server::shares::{Permission, ShareStore};
use vault_server::storage::Scope;

#[tokio::test]
async fn expired_share_is_purged_on_read() {
    let dir = TempDir::new().unwrap();
    let store = ShareStore::new(dir.path().join("shares.json"));
    let expired = Utc::now().timestamp() - 1;

    let share = store
        .create("docs", Scope::Shared, None, Permission::Read, Some(expired))
        .await
        .unwrap();

    assert!(store.get(&share.share_id).await.unwrap().is_none());
    assert!(store.get(&share.share_id).await.unwrap().is_none());

    let table = std::fs::read_to_string(store.file()).unwrap();
    assert!(!table.contains(&share.share_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_share_an_id() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ShareStore::new(dir.path().join("shares.json")));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store
                .create("docs", Scope::Shared, None, Permission::Read, None)
                .await
                .unwrap()
                .share_id
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        assert!(ids.insert(task.await.unwrap()));
    }
    assert_eq!(ids.len(), 32);

    // Every create survived: no lost updates in the table.
    for id in &ids {
        assert!(store.get(id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn private_delete_requires_owner() {
    let dir = TempDir::new().unwrap();
    let store = ShareStore::new(dir.path().join("shares.json"));
    let share = store
        .create("docs", Scope::Private, Some("alice"), Permission::Read, None)
        .await
        .unwrap();

    assert!(!store.delete(&share.share_id, "bob").await.unwrap());
    assert!(store.delete(&share.share_id, "alice").await.unwrap());
    assert!(!store.delete(&share.share_id, "alice").await.unwrap());
}

#[tokio::test]
async fn listing_filters_by_scope_owner_and_path() {
    let dir = TempDir::new().unwrap();
    let store = ShareStore::new(dir.path().join("shares.json"));
    let past = Utc::now().timestamp() - 10;

    store.create("a", Scope::Private, Some("alice"), Permission::Read, None).await.unwrap();
    store.create("b", Scope::Private, Some("alice"), Permission::Read, None).await.unwrap();
    store.create("a", Scope::Private, Some("bob"), Permission::Read, None).await.unwrap();
    store.create("a", Scope::Shared, None, Permission::Read, None).await.unwrap();
    store.create("c", Scope::Private, Some("alice"), Permission::Read, Some(past)).await.unwrap();

    assert_eq!(store.list_for("alice", Scope::Private, None).await.unwrap().len(), 2);
    assert_eq!(store.list_for("alice", Scope::Private, Some("a")).await.unwrap().len(), 1);
    assert_eq!(store.list_for("alice", Scope::Shared, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn vault_share_creation_rules() {
    let env = TestVault::new();
    let alice = env.identity("alice");
    let writer = env.identity("root-writer");
    std::fs::create_dir(env.private_root("alice").join("docs")).unwrap();
    std::fs::write(env.shared_root().join("readme.txt"), "hi").unwrap();

    let share = env
        .vault
        .create_share(&alice, "private/docs", Permission::ReadWrite, None)
        .await
        .unwrap();
    assert_eq!(share.storage_type, Scope::Private);
    assert_eq!(share.username.as_deref(), Some("alice"));
    assert_eq!(share.path, "docs");

    // Files are read-only shares only.
    let err = env
        .vault
        .create_share(&alice, "private/welcome.txt", Permission::ReadWrite, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // Shared targets need the shared-write capability.
    let err = env
        .vault
        .create_share(&alice, "shared/readme.txt", Permission::Read, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let shared = env
        .vault
        .create_share(&writer, "shared/readme.txt", Permission::Read, None)
        .await
        .unwrap();
    assert_eq!(shared.username, None);

    let err = env
        .vault
        .create_share(&alice, "private/missing", Permission::Read, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let listed = env
        .vault
        .list_shares(&alice, Scope::Private, Some("docs"))
        .await
        .unwrap();
    assert_eq!(listed, vec![share.clone()]);

    // Shared shares are removed by writers only.
    let err = env.vault.delete_share(&alice, &shared.share_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(env.vault.delete_share(&writer, &shared.share_id).await.unwrap());

    let err = env.vault.delete_share(&writer, &share.share_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(env.vault.delete_share(&alice, &share.share_id).await.unwrap());
    assert_eq!(
        env.vault.share_info(&share.share_id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}
