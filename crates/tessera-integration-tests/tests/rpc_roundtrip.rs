//! RPC behavior over a loopback pair: marshalling, multiplexing, teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tessera_core::Uri;
use tessera_rpc::{
    LoopbackTransport, Proxy, ProxyIdentifier, RemoteError, RemoteInterface, RpcError, RpcOptions,
    RpcProtocol, RpcResult, decode_args, encode_result,
};
use tessera_sandbox::host::HostFileSystem;
use tessera_sandbox::protocol::{MAIN_THREAD_FILE_SYSTEM, MainThreadFileSystem};
use tessera_test::init_test_tracing;
use tessera_vfs::{FileSystemRegistry, FileType, FsError, WriteOptions};

#[async_trait]
trait Counter: Send + Sync {
    async fn add(&self, amount: u64) -> Result<u64, RemoteError>;
    async fn hold(&self, ms: u64) -> Result<(), RemoteError>;
}

struct CounterInterface;

struct CounterClient(Proxy);

impl CounterClient {
    async fn add(&self, amount: u64) -> RpcResult<u64> {
        self.0.call("add", (amount,)).await
    }

    async fn hold(&self, ms: u64) -> RpcResult<()> {
        self.0.call("hold", (ms,)).await
    }

    async fn blob(&self, bytes: usize) -> RpcResult<Value> {
        self.0.call("add", ("x".repeat(bytes),)).await
    }
}

impl RemoteInterface for CounterInterface {
    type Server = dyn Counter;
    type Client = CounterClient;

    fn client(proxy: Proxy) -> CounterClient {
        CounterClient(proxy)
    }

    fn dispatch<'a>(
        server: &'a dyn Counter,
        method: &'a str,
        args: Value,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        Box::pin(async move {
            match method {
                "add" => {
                    let (amount,): (u64,) = decode_args(method, args)?;
                    encode_result(&server.add(amount).await?)
                },
                "hold" => {
                    let (ms,): (u64,) = decode_args(method, args)?;
                    encode_result(&server.hold(ms).await?)
                },
                other => Err(RemoteError::unknown_method("Counter", other)),
            }
        })
    }
}

const COUNTER_A: ProxyIdentifier<CounterInterface> = ProxyIdentifier::new("CounterA");
const COUNTER_B: ProxyIdentifier<CounterInterface> = ProxyIdentifier::new("CounterB");

#[derive(Default)]
struct Tally {
    total: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[async_trait]
impl Counter for Tally {
    async fn add(&self, amount: u64) -> Result<u64, RemoteError> {
        if amount == 0 {
            return Err(RemoteError::new("Zero", "nothing to add"));
        }
        let amount = usize::try_from(amount).map_err(|e| RemoteError::new("Overflow", e.to_string()))?;
        let total = self.total.fetch_add(amount, Ordering::SeqCst).saturating_add(amount);
        Ok(total as u64)
    }

    async fn hold(&self, ms: u64) -> Result<(), RemoteError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn pair(options: RpcOptions) -> (RpcProtocol, RpcProtocol) {
    init_test_tracing();
    let (a, b) = LoopbackTransport::pair_with_limit(64 * 1024);
    (
        RpcProtocol::new("host", Arc::new(a), options),
        RpcProtocol::new("sandbox", Arc::new(b), options),
    )
}

#[tokio::test]
async fn results_and_rejections_match_the_implementation() {
    let (host, sandbox) = pair(RpcOptions::default());
    host.set(COUNTER_A, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();
    let client = sandbox.get_proxy(COUNTER_A);

    assert_eq!(client.add(2).await.unwrap(), 2);
    assert_eq!(client.add(3).await.unwrap(), 5);
    assert_eq!(
        client.add(0).await.unwrap_err(),
        RpcError::Remote(RemoteError::new("Zero", "nothing to add"))
    );
}

#[tokio::test]
async fn bad_arguments_are_rejected_by_the_callee() {
    let (host, sandbox) = pair(RpcOptions::default());
    host.set(COUNTER_A, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();

    match sandbox.get_proxy(COUNTER_A).blob(4).await {
        Err(RpcError::Remote(e)) => assert_eq!(e.code, RemoteError::INVALID_ARGUMENTS),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn one_identifier_runs_requests_one_at_a_time() {
    let (host, sandbox) = pair(RpcOptions::default());
    let tally = Arc::new(Tally::default());
    host.set(COUNTER_A, Arc::clone(&tally) as Arc<dyn Counter>).unwrap();
    let client = Arc::new(sandbox.get_proxy(COUNTER_A));

    let holds = (0..4).map(|_| {
        let client = Arc::clone(&client);
        async move { client.hold(20).await }
    });
    for result in futures::future::join_all(holds).await {
        result.unwrap();
    }
    assert_eq!(tally.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_call_does_not_block_another_identifier() {
    let (host, sandbox) = pair(RpcOptions::default());
    host.set(COUNTER_A, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();
    host.set(COUNTER_B, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();

    let slow_client = sandbox.get_proxy(COUNTER_A);
    let slow = tokio::spawn(async move { slow_client.hold(400).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fast = tokio::time::timeout(
        Duration::from_millis(200),
        sandbox.get_proxy(COUNTER_B).add(1),
    )
    .await
    .expect("fast call must not wait for the slow one");
    assert_eq!(fast.unwrap(), 1);
    assert!(!slow.is_finished());
    slow.await.unwrap().unwrap();
}

#[tokio::test]
async fn calls_queue_until_the_callee_registers() {
    let (host, sandbox) = pair(RpcOptions::default());
    let client = sandbox.get_proxy(COUNTER_A);
    let early = tokio::spawn(async move { client.add(7).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!early.is_finished());
    assert_eq!(
        host.assert_registered(&[COUNTER_A.erased()]).unwrap_err(),
        RpcError::Unregistered(vec!["CounterA".to_string()])
    );

    host.set(COUNTER_A, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();
    assert_eq!(early.await.unwrap().unwrap(), 7);
    host.assert_registered(&[COUNTER_A.erased()]).unwrap();
}

#[tokio::test]
async fn dispose_rejects_in_flight_calls() {
    let (host, sandbox) = pair(RpcOptions::default());
    host.set(COUNTER_A, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();
    let sandbox = Arc::new(sandbox);

    let client = sandbox.get_proxy(COUNTER_A);
    let call = tokio::spawn(async move { client.hold(1_000).await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(sandbox.pending_calls(), 1);

    sandbox.dispose();
    assert_eq!(call.await.unwrap().unwrap_err(), RpcError::Disposed);
    assert_eq!(
        sandbox.get_proxy(COUNTER_A).add(1).await.unwrap_err(),
        RpcError::Disposed
    );
}

#[tokio::test]
async fn timeout_rejects_only_the_caller() {
    let (host, sandbox) = pair(RpcOptions::default().with_call_timeout(Some(Duration::from_millis(50))));
    host.set(COUNTER_A, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();
    let client = sandbox.get_proxy(COUNTER_A);

    assert!(matches!(
        client.hold(300).await.unwrap_err(),
        RpcError::Timeout { .. }
    ));
    // The callee still finishes the held request, then serves the next one.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.add(1).await.unwrap(), 1);
}

#[tokio::test]
async fn oversized_messages_are_refused_before_sending() {
    let (host, sandbox) = pair(RpcOptions::default());
    host.set(COUNTER_A, Arc::new(Tally::default()) as Arc<dyn Counter>).unwrap();

    let err = sandbox.get_proxy(COUNTER_A).blob(128 * 1024).await.unwrap_err();
    assert!(matches!(err, RpcError::MessageTooLarge { .. }));
    assert_eq!(sandbox.pending_calls(), 0);
}

#[tokio::test]
async fn filesystem_errors_survive_the_boundary() {
    let (host, sandbox) = pair(RpcOptions::default());
    let registry = Arc::new(FileSystemRegistry::new("file"));
    host.set(
        MAIN_THREAD_FILE_SYSTEM,
        Arc::new(HostFileSystem::new(Arc::clone(&registry))) as Arc<dyn MainThreadFileSystem>,
    )
    .unwrap();
    let fs = sandbox.get_proxy(MAIN_THREAD_FILE_SYSTEM);

    let binary: Vec<u8> = (0..=255).collect();
    fs.write_file(&Uri::file("/bin.dat"), &binary, WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(registry.read_file(&Uri::file("/bin.dat")).await.unwrap(), binary);
    assert_eq!(fs.read_file(&Uri::file("/bin.dat")).await.unwrap(), binary);
    assert_eq!(
        fs.readdir(&Uri::file("/")).await.unwrap(),
        vec![("bin.dat".to_string(), FileType::File)]
    );

    let missing = fs.stat(&Uri::file("/missing")).await.unwrap_err();
    assert!(missing.is_not_found());
    let directory = fs.read_file(&Uri::file("/")).await.unwrap_err();
    assert!(matches!(directory, FsError::FileIsADirectory(_)));
}

#[tokio::test]
async fn file_too_large_for_one_reply_fails_instead_of_hanging() {
    let (host, sandbox) = pair(RpcOptions::default());
    let registry = Arc::new(FileSystemRegistry::new("file"));
    registry.memory().insert_file("/huge.bin", vec![7_u8; 60 * 1024]);
    host.set(
        MAIN_THREAD_FILE_SYSTEM,
        Arc::new(HostFileSystem::new(Arc::clone(&registry))) as Arc<dyn MainThreadFileSystem>,
    )
    .unwrap();
    let fs = sandbox.get_proxy(MAIN_THREAD_FILE_SYSTEM);

    let outcome = tokio::time::timeout(Duration::from_secs(2), fs.read_file(&Uri::file("/huge.bin")))
        .await
        .expect("oversized reply must still answer the caller");
    assert!(matches!(outcome, Err(FsError::Unknown(_))));
    assert!(fs.read_file(&Uri::file("/missing")).await.unwrap_err().is_not_found());
}
