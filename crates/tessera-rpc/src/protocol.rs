//! Call multiplexing and per-identifier dispatch.
//!
//! Each side of the channel owns one [`RpcProtocol`]. Outgoing calls get a
//! fresh call id and park a oneshot until the matching reply arrives.
//! Incoming requests are routed by identifier name to an actor task owned by
//! that identifier's implementation, so calls on one identifier run in
//! arrival order while different identifiers progress independently.
//!
//! Requests for an identifier that has no implementation yet are queued and
//! flushed, in arrival order, once [`RpcProtocol::set`] runs.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{RemoteError, RpcError, RpcResult};
use crate::identifier::{ErasedIdentifier, ProxyIdentifier, RemoteInterface};
use crate::message::RpcMessage;
use crate::transport::{InFlight, MessagePassing};

/// Protocol options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcOptions {
    /// Fail outgoing calls that get no reply within this window.
    pub call_timeout: Option<Duration>,
}

impl RpcOptions {
    /// Set the outgoing call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }
}

type ReplySender = oneshot::Sender<Result<Value, RemoteError>>;

struct Request {
    call_id: u64,
    method: String,
    args: Value,
}

enum Slot {
    /// Requests received before an implementation was set.
    Queued(Vec<Request>),
    /// Feed for the identifier's actor task.
    Serving(mpsc::UnboundedSender<Request>),
}

struct Shared {
    side: String,
    transport: Arc<dyn MessagePassing>,
    options: RpcOptions,
    next_call_id: AtomicU64,
    pending: Mutex<HashMap<u64, ReplySender>>,
    slots: Mutex<HashMap<String, Slot>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Requests handed to an actor whose reply has not been sent.
    serving: InFlight,
    disposed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn handle_message(&self, bytes: &[u8]) {
        match RpcMessage::decode(bytes) {
            Ok(RpcMessage::Request {
                call_id,
                target,
                method,
                args,
            }) => self.route(
                target,
                Request {
                    call_id,
                    method,
                    args,
                },
            ),
            Ok(RpcMessage::Reply { call_id, result }) => self.resolve(call_id, result),
            Err(e) => {
                warn!(side = %self.side, error = %e, "Dropping undecodable message");
            },
        }
    }

    fn route(&self, target: String, request: Request) {
        let mut slots = lock(&self.slots);
        match slots.get_mut(&target) {
            Some(Slot::Serving(feed)) => {
                self.serving.begin();
                if feed.send(request).is_err() {
                    self.serving.complete();
                }
            },
            Some(Slot::Queued(queue)) => queue.push(request),
            None => {
                debug!(
                    side = %self.side,
                    identifier = %target,
                    method = %request.method,
                    "Queueing request for identifier without implementation"
                );
                slots.insert(target, Slot::Queued(vec![request]));
            },
        }
    }

    fn resolve(&self, call_id: u64, result: Result<Value, RemoteError>) {
        let waiter = lock(&self.pending).remove(&call_id);
        match waiter {
            Some(waiter) => {
                // The caller may have given up already.
                let _ = waiter.send(result);
            },
            None => {
                debug!(side = %self.side, call_id, "Reply for unknown or expired call");
            },
        }
    }

    fn send_reply(&self, call_id: u64, result: Result<Value, RemoteError>) {
        if self.is_disposed() {
            return;
        }
        let Err(e) = self.encode_and_send(call_id, result) else {
            return;
        };
        warn!(side = %self.side, call_id, error = %e, "Failed to send reply");
        if matches!(e, RpcError::Closed | RpcError::Disposed) {
            return;
        }
        // The caller is still parked on this call id; answer it with
        // something small enough to get through.
        let fallback = Err(RemoteError::new(
            RemoteError::REPLY_UNDELIVERABLE,
            format!("reply could not be delivered: {e}"),
        ));
        if let Err(e) = self.encode_and_send(call_id, fallback) {
            warn!(side = %self.side, call_id, error = %e, "Failed to send fallback reply");
        }
    }

    fn encode_and_send(&self, call_id: u64, result: Result<Value, RemoteError>) -> RpcResult<()> {
        RpcMessage::Reply { call_id, result }
            .encode()
            .and_then(|bytes| self.transport.send(bytes))
    }
}

/// One side of an RPC channel.
///
/// Dropping the protocol disposes it.
pub struct RpcProtocol {
    shared: Arc<Shared>,
}

impl RpcProtocol {
    /// Start a protocol over `transport`. `side` labels log lines.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(
        side: impl Into<String>,
        transport: Arc<dyn MessagePassing>,
        options: RpcOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            side: side.into(),
            transport,
            options,
            next_call_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            serving: InFlight::default(),
            disposed: AtomicBool::new(false),
        });
        let reader = spawn_reader(&shared);
        lock(&shared.tasks).push(reader);
        debug!(side = %shared.side, "RPC protocol started");
        Self { shared }
    }

    /// Side label.
    #[must_use]
    pub fn side(&self) -> &str {
        &self.shared.side
    }

    /// Register the implementation for `identifier`, flushing any requests
    /// that arrived before it.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::AlreadyRegistered`] if an implementation is
    /// already set, or [`RpcError::Disposed`] after disposal.
    pub fn set<I: RemoteInterface>(
        &self,
        identifier: ProxyIdentifier<I>,
        server: Arc<I::Server>,
    ) -> RpcResult<()> {
        if self.shared.is_disposed() {
            return Err(RpcError::Disposed);
        }
        let name = identifier.name();
        let mut slots = lock(&self.shared.slots);
        let queued = match slots.remove(name) {
            Some(Slot::Serving(feed)) => {
                slots.insert(name.to_string(), Slot::Serving(feed));
                return Err(RpcError::AlreadyRegistered(name.to_string()));
            },
            Some(Slot::Queued(queued)) => queued,
            None => Vec::new(),
        };

        let (feed, requests) = mpsc::unbounded_channel();
        let flushed = queued.len();
        for request in queued {
            self.shared.serving.begin();
            if feed.send(request).is_err() {
                self.shared.serving.complete();
            }
        }
        let actor = spawn_actor::<I>(&self.shared, name, server, requests);
        lock(&self.shared.tasks).push(actor);
        slots.insert(name.to_string(), Slot::Serving(feed));

        debug!(
            side = %self.shared.side,
            identifier = name,
            flushed,
            "Implementation registered"
        );
        Ok(())
    }

    /// Typed client for the peer's implementation of `identifier`.
    ///
    /// Calls made before the peer registers are held there until it does.
    #[must_use]
    pub fn get_proxy<I: RemoteInterface>(&self, identifier: ProxyIdentifier<I>) -> I::Client {
        I::client(Proxy {
            shared: Arc::clone(&self.shared),
            target: identifier.name(),
        })
    }

    /// Identifiers with an implementation set on this side, sorted.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        let slots = lock(&self.shared.slots);
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Serving(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Identifiers the peer addressed that have no implementation, sorted.
    #[must_use]
    pub fn queued_identifiers(&self) -> Vec<String> {
        let slots = lock(&self.shared.slots);
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Queued(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Check that every expected identifier has an implementation here.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Unregistered`] listing the missing identifiers.
    pub fn assert_registered(&self, expected: &[ErasedIdentifier]) -> RpcResult<()> {
        let missing: Vec<String> = {
            let slots = lock(&self.shared.slots);
            expected
                .iter()
                .filter(|id| !matches!(slots.get(id.name()), Some(Slot::Serving(_))))
                .map(|id| id.name().to_string())
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }
        warn!(side = %self.shared.side, missing = ?missing, "Identifiers never registered");
        Err(RpcError::Unregistered(missing))
    }

    /// Number of outgoing calls awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    /// Wait until every received request has been answered and every sent
    /// message has been taken by the peer.
    pub async fn drain(&self) {
        self.shared.serving.wait_idle().await;
        self.shared.transport.drain().await;
    }

    /// True after `dispose`.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Stop all tasks, reject pending calls with [`RpcError::Disposed`] and
    /// close the transport. Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = std::mem::take(&mut *lock(&self.shared.tasks));
        for task in &tasks {
            task.abort();
        }
        let rejected = {
            let mut pending = lock(&self.shared.pending);
            let count = pending.len();
            pending.clear();
            count
        };
        let unserved: Vec<String> = {
            let mut slots = lock(&self.shared.slots);
            let names = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Queued(q) if !q.is_empty()))
                .map(|(name, _)| name.clone())
                .collect();
            slots.clear();
            names
        };
        if !unserved.is_empty() {
            warn!(
                side = %self.shared.side,
                identifiers = ?unserved,
                "Disposed with requests for identifiers that were never registered"
            );
        }
        self.shared.transport.close();
        debug!(side = %self.shared.side, rejected, "RPC protocol disposed");
    }
}

impl Drop for RpcProtocol {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for RpcProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcProtocol")
            .field("side", &self.shared.side)
            .field("registered", &self.registered())
            .field("pending_calls", &self.pending_calls())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Untyped handle for calling one remote identifier.
///
/// Typed clients wrap this; see [`RemoteInterface::client`].
#[derive(Clone)]
pub struct Proxy {
    shared: Arc<Shared>,
    target: &'static str,
}

impl Proxy {
    /// Identifier this proxy calls.
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Call `method` with `args`, decoding the reply into `R`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Remote`] when the callee fails,
    /// [`RpcError::Timeout`] when no reply arrives in time, and
    /// [`RpcError::Disposed`] when the protocol goes away first.
    pub async fn call<A, R>(&self, method: &str, args: A) -> RpcResult<R>
    where
        A: Serialize + Send,
        R: DeserializeOwned,
    {
        let args = serde_json::to_value(args).map_err(|e| RpcError::Encode(e.to_string()))?;
        let value = self.call_value(method, args).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }

    /// Call with pre-encoded arguments and return the raw reply value.
    ///
    /// # Errors
    ///
    /// Same as [`Proxy::call`].
    pub async fn call_value(&self, method: &str, args: Value) -> RpcResult<Value> {
        let shared = &self.shared;
        let call_id = shared.next_call_id.fetch_add(1, Ordering::Relaxed);
        let bytes = RpcMessage::Request {
            call_id,
            target: self.target.to_string(),
            method: method.to_string(),
            args,
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&shared.pending);
            if shared.is_disposed() {
                return Err(RpcError::Disposed);
            }
            pending.insert(call_id, tx);
        }
        if let Err(e) = shared.transport.send(bytes) {
            lock(&shared.pending).remove(&call_id);
            return Err(e);
        }
        trace!(side = %shared.side, call_id, identifier = self.target, method, "Call sent");

        let reply = match shared.options.call_timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    lock(&shared.pending).remove(&call_id);
                    warn!(
                        side = %shared.side,
                        call_id,
                        identifier = self.target,
                        method,
                        "Call timed out"
                    );
                    return Err(RpcError::Timeout {
                        target: self.target.to_string(),
                        method: method.to_string(),
                        after,
                    });
                },
            },
            None => rx.await,
        };

        match reply {
            Ok(result) => result.map_err(RpcError::Remote),
            Err(_) => Err(RpcError::Disposed),
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("side", &self.shared.side)
            .field("target", &self.target)
            .finish()
    }
}

fn spawn_reader(shared: &Arc<Shared>) -> JoinHandle<()> {
    let transport = Arc::clone(&shared.transport);
    let shared: Weak<Shared> = Arc::downgrade(shared);
    tokio::spawn(async move {
        while let Some(bytes) = transport.recv().await {
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.handle_message(&bytes);
        }
        trace!("RPC reader stopped");
    })
}

fn spawn_actor<I: RemoteInterface>(
    shared: &Arc<Shared>,
    identifier: &'static str,
    server: Arc<I::Server>,
    mut requests: mpsc::UnboundedReceiver<Request>,
) -> JoinHandle<()> {
    let shared: Weak<Shared> = Arc::downgrade(shared);
    tokio::spawn(async move {
        while let Some(Request {
            call_id,
            method,
            args,
        }) = requests.recv().await
        {
            let outcome = AssertUnwindSafe(I::dispatch(&*server, &method, args))
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(identifier, method = %method, "Implementation panicked");
                    Err(RemoteError::new(
                        RemoteError::PANICKED,
                        format!("{identifier}.{method} panicked"),
                    ))
                },
            };
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.send_reply(call_id, result);
            shared.serving.complete();
        }
    })
}
