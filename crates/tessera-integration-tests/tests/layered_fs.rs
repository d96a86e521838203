//! Layered filesystem precedence and error semantics across delegates.

use std::sync::Arc;

use tessera_test::{ProviderCall, ScriptedProvider, init_test_tracing, test_uri};
use tessera_vfs::{
    FallthroughError, FileChange, FileSystemProvider, FileType, FsError, LayeredFileSystem,
    MemoryFileSystemProvider, WriteOptions,
};

fn memory() -> Arc<MemoryFileSystemProvider> {
    Arc::new(MemoryFileSystemProvider::new())
}

#[tokio::test]
async fn readonly_store_shadows_memory_and_refuses_writes() {
    init_test_tracing();
    let layered = LayeredFileSystem::new();
    let fallback = memory();
    let _ro = layered.register(1, ScriptedProvider::new("ro").readonly().with_file("/a.txt", "hi").shared());
    let _mem = layered.register(0, Arc::clone(&fallback) as Arc<dyn FileSystemProvider>);

    assert_eq!(layered.read_file(&test_uri("/a.txt")).await.unwrap(), b"hi");

    let err = layered
        .write_file(&test_uri("/a.txt"), b"x", WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Fallthrough(FallthroughError::NoPermission(_))));

    layered
        .write_file(&test_uri("/b.txt"), b"x", WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(fallback.read_file(&test_uri("/b.txt")).await.unwrap(), b"x");
}

#[tokio::test]
async fn per_file_readonly_beats_a_writable_store() {
    let layered = LayeredFileSystem::new();
    let fallback = memory();
    fallback.insert_file("/locked.txt", b"old".to_vec());
    fallback.set_file_readonly("/locked.txt", true).unwrap();
    let front = Arc::new(ScriptedProvider::new("front"));
    let _front = layered.register(5, Arc::clone(&front) as Arc<dyn FileSystemProvider>);
    let _mem = layered.register(0, Arc::clone(&fallback) as Arc<dyn FileSystemProvider>);

    let err = layered
        .write_file(&test_uri("/locked.txt"), b"new", WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Fallthrough(FallthroughError::NoPermission(_))));
    assert!(front.file("/locked.txt").is_none());
    assert_eq!(fallback.read_file(&test_uri("/locked.txt")).await.unwrap(), b"old");
}

#[tokio::test]
async fn fatal_error_stops_the_read_path() {
    let layered = LayeredFileSystem::new();
    let front = Arc::new(
        ScriptedProvider::new("front").with_failure("/a.txt", FsError::Unknown("corrupt".into())),
    );
    let back = Arc::new(ScriptedProvider::new("back").with_file("/a.txt", "fine"));
    let _f = layered.register(2, Arc::clone(&front) as Arc<dyn FileSystemProvider>);
    let _b = layered.register(1, Arc::clone(&back) as Arc<dyn FileSystemProvider>);

    let err = layered.read_file(&test_uri("/a.txt")).await.unwrap_err();
    assert_eq!(err, FsError::Unknown("corrupt".into()));
    assert!(back.calls().is_empty());
}

#[tokio::test]
async fn fallthrough_errors_try_the_next_store() {
    let layered = LayeredFileSystem::new();
    let front = Arc::new(
        ScriptedProvider::new("front").with_failure("/a.txt", FsError::unavailable("/a.txt")),
    );
    let back = Arc::new(ScriptedProvider::new("back").with_file("/a.txt", "fine"));
    let _f = layered.register(2, Arc::clone(&front) as Arc<dyn FileSystemProvider>);
    let _b = layered.register(1, Arc::clone(&back) as Arc<dyn FileSystemProvider>);

    assert_eq!(layered.read_file(&test_uri("/a.txt")).await.unwrap(), b"fine");
    assert_eq!(front.calls(), vec![ProviderCall::ReadFile("/a.txt".into())]);
    assert_eq!(back.calls(), vec![ProviderCall::ReadFile("/a.txt".into())]);
}

#[tokio::test]
async fn exhausted_read_reports_the_first_error() {
    let layered = LayeredFileSystem::new();
    let _f = layered.register(
        2,
        ScriptedProvider::new("front")
            .with_failure("/a.txt", FsError::no_permission("/a.txt"))
            .shared(),
    );
    let _b = layered.register(1, ScriptedProvider::new("back").shared());

    let err = layered.read_file(&test_uri("/a.txt")).await.unwrap_err();
    assert!(matches!(err, FsError::Fallthrough(FallthroughError::NoPermission(_))));
}

#[tokio::test]
async fn no_stores_is_unavailable() {
    let layered = LayeredFileSystem::new();
    let err = layered.stat(&test_uri("/a.txt")).await.unwrap_err();
    assert!(matches!(err, FsError::Fallthrough(FallthroughError::Unavailable(_))));
}

#[tokio::test]
async fn readdir_merges_and_prefers_higher_priority() {
    let layered = LayeredFileSystem::new();
    let _f = layered.register(
        2,
        ScriptedProvider::new("front")
            .with_file("/shared/inner.txt", "dir wins")
            .with_file("/front.txt", "f")
            .shared(),
    );
    let _b = layered.register(
        1,
        ScriptedProvider::new("back")
            .with_file("/shared", "file loses")
            .with_file("/back.txt", "b")
            .shared(),
    );

    let entries = layered.readdir(&test_uri("/")).await.unwrap();
    assert_eq!(
        entries,
        vec![
            ("back.txt".to_string(), FileType::File),
            ("front.txt".to_string(), FileType::File),
            ("shared".to_string(), FileType::Directory),
        ]
    );
}

#[tokio::test]
async fn detaching_reveals_the_lower_store() {
    let layered = LayeredFileSystem::new();
    let front = layered.register(2, ScriptedProvider::new("front").with_file("/a.txt", "front").shared());
    let _b = layered.register(1, ScriptedProvider::new("back").with_file("/a.txt", "back").shared());

    assert_eq!(layered.read_file(&test_uri("/a.txt")).await.unwrap(), b"front");
    front.dispose();
    assert_eq!(layered.read_file(&test_uri("/a.txt")).await.unwrap(), b"back");
    assert_eq!(layered.priorities(), vec![1]);
}

#[tokio::test]
async fn changes_from_every_store_share_one_stream() {
    let layered = LayeredFileSystem::new();
    let front = Arc::new(ScriptedProvider::new("front"));
    let back = Arc::new(ScriptedProvider::new("back"));
    let _f = layered.register(2, Arc::clone(&front) as Arc<dyn FileSystemProvider>);
    let _b = layered.register(1, Arc::clone(&back) as Arc<dyn FileSystemProvider>);

    let mut rx = layered.on_did_change_file().subscribe();
    front.fire_change(vec![FileChange::created(test_uri("/one"))]);
    back.fire_change(vec![FileChange::deleted(test_uri("/two"))]);

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first[0].uri, test_uri("/one"));
    assert_eq!(second[0].uri, test_uri("/two"));
}
