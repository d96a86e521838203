//! End-to-end sandbox host: configuration, capability wiring, extension API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tessera_capabilities::{CapabilityName, CapabilityProvider, CapabilitySet, HostContext};
use tessera_config::HostConfig;
use tessera_core::{ServiceAccessor, ServiceCollection, Uri};
use tessera_rpc::RpcError;
use tessera_sandbox::capabilities::{ExtHostCommandRegistry, ExtHostFileSystem};
use tessera_sandbox::host::CommandEvent;
use tessera_sandbox::{SandboxError, SandboxHost, command_handler};
use tessera_storage::{FileKvStore, KvStore};
use tessera_test::{init_test_tracing, temp_workspace, test_config, test_identity};

/// Exposed by the custom provider below.
struct Outline {
    headings: Vec<String>,
}

struct Greeting(&'static str);

#[tokio::test]
async fn concurrent_first_use_initializes_once() {
    init_test_tracing();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let host = Arc::new(
        SandboxHost::builder()
            .config(test_config())
            .provider(
                CapabilityName::Storage,
                CapabilityProvider::new(move |_, _, _| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(Arc::new(()))
                    }
                }),
            )
            .build()
            .unwrap(),
    );

    let mut tasks = Vec::new();
    for i in 0..6 {
        let host = Arc::clone(&host);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                host.initialize().await.map(|set| set.len())
            } else {
                host.initialize().await.map(|set| set.names().len())
            }
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 4);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn custom_provider_builds_on_builtin_capabilities() {
    let hooks: ServiceAccessor = ServiceCollection::new()
        .with(Arc::new(Greeting("hello from hooks")))
        .build();
    let host = SandboxHost::builder()
        .hooks(hooks)
        .provider(
            CapabilityName::Documents,
            CapabilityProvider::new(
                |_, host: HostContext, resolved: CapabilitySet| async move {
                    let greeting = host.hooks().require::<Greeting>()?;
                    let fs = resolved.require::<ExtHostFileSystem>(CapabilityName::FileSystem)?;
                    let readme = fs.read_file(&Uri::file("/README.md")).await.unwrap_or_default();
                    let mut headings: Vec<String> = String::from_utf8_lossy(&readme)
                        .lines()
                        .filter(|line| line.starts_with('#'))
                        .map(str::to_string)
                        .collect();
                    headings.push(greeting.0.to_string());
                    Ok(Arc::new(Outline { headings }))
                },
            )
            .depends_on(CapabilityName::FileSystem),
        )
        .build()
        .unwrap();
    host.filesystem()
        .memory()
        .insert_file("/README.md", b"# Title\ntext\n## Usage\n".to_vec());

    let resolved = host.initialize().await.unwrap();
    let outline = resolved.require::<Outline>(CapabilityName::Documents).unwrap();
    assert_eq!(outline.headings, vec!["# Title", "## Usage", "hello from hooks"]);

    // The workspace API needs the built-in documents capability, so no
    // surface is handed out rather than a partial one.
    let err = host.api(None).await.unwrap_err();
    assert!(matches!(err, SandboxError::Capability(_)));
}

#[tokio::test]
async fn configured_mounts_layer_over_memory() {
    let disk = temp_workspace(&[("src/main.rs", "fn main() {}"), ("shadowed.txt", "disk")]);
    let toml = format!(
        r#"
[log]
level = "debug"

[rpc]
call_timeout_ms = 2000

[[filesystem.mounts]]
priority = 10
kind = "directory"
path = "{}"

[[filesystem.mounts]]
priority = 5
kind = "kv"
namespace = "scratch"
"#,
        disk.path().display().to_string().replace('\\', "/")
    );
    let config = HostConfig::from_toml(&toml).unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn KvStore> = Arc::new(FileKvStore::open(state_dir.path().join("state.json")).await.unwrap());

    let host = SandboxHost::builder()
        .config(config)
        .state_store(Arc::clone(&store))
        .build()
        .unwrap();
    host.filesystem().memory().insert_file("/shadowed.txt", b"memory".to_vec());
    host.filesystem().memory().insert_file("/only-memory.txt", b"m".to_vec());

    let api = host.api(Some(&test_identity("mounts"))).await.unwrap();
    let fs = api.workspace().fs();

    assert_eq!(fs.read_file(&Uri::file("/shadowed.txt")).await.unwrap(), b"disk");
    assert_eq!(fs.read_file(&Uri::file("/only-memory.txt")).await.unwrap(), b"m");

    let names: Vec<String> = fs
        .read_directory(&Uri::file("/"))
        .await
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert!(names.contains(&"src".to_string()));
    assert!(names.contains(&"only-memory.txt".to_string()));

    let doc = api
        .workspace()
        .open_text_document(&Uri::file("/src/main.rs"))
        .await
        .unwrap();
    assert_eq!(doc.text(), "fn main() {}");

    host.shutdown().await;
    assert_eq!(
        host.api(None).await.unwrap_err(),
        SandboxError::ShutDown
    );
}

#[tokio::test]
async fn mementos_persist_across_hosts() {
    let state_dir = tempfile::tempdir().unwrap();
    let ext = test_identity("counter");

    for expected in [1_u32, 2] {
        let store: Arc<dyn KvStore> = Arc::new(FileKvStore::open(state_dir.path().join("state.json")).await.unwrap());
        let host = SandboxHost::builder().state_store(store).build().unwrap();
        let api = host.api(Some(&ext)).await.unwrap();
        let state = api.storage().state();
        let count = state.get::<u32>("runs").await.unwrap().unwrap_or(0).saturating_add(1);
        state.update("runs", &count).await.unwrap();
        assert_eq!(count, expected);
        host.shutdown().await;
    }
}

#[tokio::test]
async fn sandbox_commands_appear_in_the_host_table() {
    let host = SandboxHost::builder().config(test_config()).build().unwrap();
    let mut events = host.commands().events().subscribe();
    let api = host.api(Some(&test_identity("cmds"))).await.unwrap();

    let registration = api
        .commands()
        .register_command(
            "cmds.fail",
            command_handler(|_| async { Err(anyhow::anyhow!("refused")) }),
        )
        .await
        .unwrap();
    assert_eq!(
        *events.recv().await.unwrap(),
        CommandEvent::Registered("cmds.fail".to_string())
    );

    match host.commands().execute("cmds.fail", vec![]).await {
        Err(SandboxError::Rpc(RpcError::Remote(remote))) => {
            assert_eq!(remote.code, "CommandFailed");
            assert!(remote.message.contains("refused"));
        },
        other => panic!("unexpected {other:?}"),
    }

    let duplicate = api
        .commands()
        .register_command("cmds.fail", command_handler(|_| async { Ok(json!(null)) }))
        .await
        .unwrap_err();
    assert_eq!(duplicate, SandboxError::CommandExists("cmds.fail".to_string()));

    registration.dispose();
    assert_eq!(
        *events.recv().await.unwrap(),
        CommandEvent::Unregistered("cmds.fail".to_string())
    );
    assert!(host.commands().commands().is_empty());

    let resolved = host.initialize().await.unwrap();
    let registry = resolved
        .require::<ExtHostCommandRegistry>(CapabilityName::Commands)
        .unwrap();
    assert!(registry.local_commands().is_empty());
}

#[tokio::test]
async fn identities_see_the_same_workspace() {
    let host = SandboxHost::builder().build().unwrap();
    let writer = host.api(Some(&test_identity("writer"))).await.unwrap();
    let reader = host.api(Some(&test_identity("reader"))).await.unwrap();

    let uri = writer.workspace().uri("/shared.json").unwrap();
    writer
        .workspace()
        .fs()
        .write_file(&uri, br#"{"ok":true}"#)
        .await
        .unwrap();
    let bytes = reader.workspace().fs().read_file(&uri).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value, json!({"ok": true}));

    assert_ne!(
        writer.storage().state().namespace(),
        reader.storage().state().namespace()
    );
    assert_eq!(writer.env().session_id(), reader.env().session_id());
    assert_eq!(writer.env().scheme(), "file");
}
