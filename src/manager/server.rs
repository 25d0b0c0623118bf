//! The manager itself: accept loop, client registry and control surface.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::handler::{RequestHandler, Response, ResponseHandler};
use crate::manager::client::Client;
use crate::manager::dispatch::WriteResponse;
use crate::pool::{Pool, PoolConfig, PoolError, PoolStats};

/// Backoff between listener rebind attempts after the previous one failed.
const REBIND_BACKOFF: Duration = Duration::from_secs(1);

/// Errors returned by [`Manager`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `start` was called while the accept loop is already running.
    #[error("manager already started")]
    AlreadyStarted,

    /// `stop` was called without a running accept loop.
    #[error("manager not started")]
    NotStarted,

    /// `start` was called after `stop`. Managers are not restartable.
    #[error("manager already stopped")]
    Stopped,

    /// The initial listener bind failed.
    #[error("listener bind failed: {0}")]
    Bind(#[source] io::Error),

    /// `dispatch` named an address with no registered client.
    #[error("address not connected: {0}")]
    NotConnected(SocketAddr),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// How an `accept` error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetErrorKind {
    /// Log and keep accepting on the same listener.
    Transient,
    /// Drop the listener and rebind.
    Permanent,
}

/// Classifies an `accept` failure. Per-connection failures are transient,
/// anything suggesting the listener itself is unhealthy forces a rebind.
pub(crate) fn classify_accept_error(e: &io::Error) -> NetErrorKind {
    use io::ErrorKind::*;
    match e.kind() {
        ConnectionAborted | ConnectionReset | Interrupted | WouldBlock | TimedOut => {
            NetErrorKind::Transient
        }
        _ => NetErrorKind::Permanent,
    }
}

/// State shared between the manager handle, the accept task, the read
/// pipelines and the pool work items.
pub(crate) struct Shared {
    name: String,
    config: Config,
    resolved: SocketAddr,
    bound: StdMutex<Option<SocketAddr>>,
    clients: StdMutex<HashMap<String, Arc<Client>>>,
    recv: Arc<Pool>,
    send: Arc<Pool>,
    user_pools: bool,
    drop_conns: AtomicBool,
    shutting_down: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl Shared {
    pub(crate) fn request_handler(&self) -> &Arc<dyn RequestHandler> {
        &self.config.request_handler
    }

    pub(crate) fn response_handler(&self) -> &Arc<dyn ResponseHandler> {
        &self.config.response_handler
    }

    pub(crate) fn recv_pool(&self) -> &Arc<Pool> {
        &self.recv
    }

    /// Emits a diagnostic event through `tracing` and the optional
    /// configured callback.
    pub(crate) fn event(&self, trace_id: &str, category: &str, message: &str) {
        debug!(manager = %self.name, trace_id = %trace_id, category = %category, "{message}");
        if let Some(cb) = &self.config.event {
            cb(trace_id, category, message);
        }
    }

    /// Registers an accepted socket and starts its read pipeline. A second
    /// connection from an already-registered address is closed untouched.
    /// Joins are serialized on the accept task.
    pub(crate) async fn join(self: &Arc<Self>, trace_id: &str, stream: TcpStream, peer: SocketAddr) {
        let key = peer.to_string();
        let ctx = format!("{trace_id}-{key}");
        self.event(&ctx, "join", &format!("Remote[ {peer} ]"));

        if self.clients.lock().unwrap().contains_key(&key) {
            self.event(&ctx, "join", &format!("ERROR : address already connected : {peer}"));
            return;
        }

        let (reader, writer) = self.config.binder.bind(&ctx, stream).await;
        let client = Client::new(peer, writer);
        self.clients.lock().unwrap().insert(key, Arc::clone(&client));
        client.start_pipeline(Arc::clone(self), reader, ctx);
    }

    /// Removes a client from the registry and closes its write half.
    /// Called once per client, from its own pipeline on the way out.
    pub(crate) async fn remove(&self, trace_id: &str, addr: SocketAddr) {
        self.event(trace_id, "remove", &format!("Address[ {addr} ]"));

        let client = self.clients.lock().unwrap().remove(&addr.to_string());
        match client {
            Some(client) => client.shutdown_writer().await,
            None => {
                self.event(trace_id, "remove", &format!("ERROR : address already removed : {addr}"));
            }
        }
    }
}

/// A reusable TCP connection manager.
///
/// Owns one listener, a registry of connected clients, and a receive and
/// a send worker pool. Protocol behavior is plugged in through the
/// [`ConnBinder`](crate::ConnBinder),
/// [`RequestHandler`](crate::RequestHandler) and
/// [`ResponseHandler`](crate::ResponseHandler) contracts carried by the
/// [`Config`].
///
/// Lifecycle is `new` then `start` then `stop`. A stopped manager cannot
/// be restarted.
pub struct Manager {
    shared: Arc<Shared>,
    accept: Mutex<Option<JoinHandle<()>>>,
}

impl Manager {
    /// Validates the configuration, resolves the listen address and builds
    /// the worker pools. Must be called from within a tokio runtime.
    ///
    /// Nothing touches the network until [`start`](Manager::start).
    pub fn new(
        trace_id: &str,
        name: impl Into<String>,
        config: Config,
    ) -> Result<Self, ManagerError> {
        let name = name.into();
        config.validate()?;
        let resolved = config.resolve()?;

        let (recv, send, user_pools) = match (&config.recv_pool, &config.send_pool) {
            (Some(recv), Some(send)) => (Arc::clone(recv), Arc::clone(send), true),
            _ => {
                let recv = Pool::new(
                    trace_id,
                    format!("{name}-recv"),
                    PoolConfig {
                        min_workers: config.recv_min_workers,
                        max_workers: config.recv_max_workers,
                    },
                )?;
                let send = Pool::new(
                    trace_id,
                    format!("{name}-send"),
                    PoolConfig {
                        min_workers: config.send_min_workers,
                        max_workers: config.send_max_workers,
                    },
                )?;
                (Arc::new(recv), Arc::new(send), false)
            }
        };

        let (shutdown_tx, _) = watch::channel(false);

        info!(manager = %name, addr = %resolved, net_type = %config.net_type, "manager created");

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                config,
                resolved,
                bound: StdMutex::new(None),
                clients: StdMutex::new(HashMap::new()),
                recv,
                send,
                user_pools,
                drop_conns: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                shutdown_tx,
            }),
            accept: Mutex::new(None),
        })
    }

    /// Binds the listener and spawns the accept task. Returns once the
    /// listener is accepting, so a caller may connect immediately after.
    ///
    /// The initial bind failure is returned here; later rebind failures
    /// are retried inside the accept task.
    pub async fn start(&self, trace_id: &str) -> Result<(), ManagerError> {
        let mut slot = self.accept.lock().await;
        if slot.is_some() {
            return Err(ManagerError::AlreadyStarted);
        }
        if self.shared.shutting_down.load(Ordering::Acquire) {
            return Err(ManagerError::Stopped);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            trace_id.to_string(),
            ready_tx,
        ));

        match ready_rx.await {
            Ok(Ok(addr)) => {
                info!(manager = %self.shared.name, addr = %addr, "manager started");
                *slot = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.await;
                Err(ManagerError::Bind(e))
            }
            Err(_) => {
                let _ = handle.await;
                Err(ManagerError::Bind(io::Error::other(
                    "accept task exited before binding",
                )))
            }
        }
    }

    /// Shuts the manager down: stops accepting, drains the owned pools,
    /// drops every registered client and waits for the accept task.
    ///
    /// Externally-owned pools are left running for their owner.
    pub async fn stop(&self, trace_id: &str) -> Result<(), ManagerError> {
        let mut slot = self.accept.lock().await;
        let handle = slot.take().ok_or(ManagerError::NotStarted)?;

        info!(manager = %self.shared.name, "manager stopping");
        self.shared.shutting_down.store(true, Ordering::Release);
        let _ = self.shared.shutdown_tx.send(true);

        if !self.shared.user_pools {
            self.shared.recv.shutdown(trace_id).await;
            self.shared.send.shutdown(trace_id).await;
        }

        let clients: Vec<Arc<Client>> =
            self.shared.clients.lock().unwrap().values().cloned().collect();
        for client in clients {
            client.drop_conn().await;
        }

        if let Err(e) = handle.await {
            warn!(manager = %self.shared.name, error = %e, "accept task panicked");
        }

        // A join in flight during the first snapshot can register late.
        // The accept task is gone now, so a second sweep is final.
        let stragglers: Vec<Arc<Client>> =
            self.shared.clients.lock().unwrap().values().cloned().collect();
        for client in stragglers {
            client.drop_conn().await;
        }

        info!(manager = %self.shared.name, "manager stopped");
        Ok(())
    }

    /// Queues a response for delivery on the send pool. Blocks while the
    /// send queue is full.
    ///
    /// Fails fast if the target address has no registered client.
    pub async fn dispatch(&self, trace_id: &str, response: Response) -> Result<(), ManagerError> {
        let client = self
            .shared
            .clients
            .lock()
            .unwrap()
            .get(&response.addr.to_string())
            .cloned();

        let client = client.ok_or(ManagerError::NotConnected(response.addr))?;
        let task = WriteResponse::new(Arc::clone(&self.shared), client, response);
        self.shared.send.submit(trace_id, Box::new(task)).await?;
        Ok(())
    }

    /// Toggles immediate-close mode. While set, accepted connections are
    /// closed without registration. Existing clients are unaffected.
    pub fn drop_connections(&self, trace_id: &str, drop: bool) {
        self.shared.drop_conns.store(drop, Ordering::Release);
        self.shared
            .event(trace_id, "accept", &format!("drop connections : {drop}"));
    }

    /// Snapshot of the receive pool counters.
    pub fn stats_recv(&self) -> PoolStats {
        self.shared.recv.stats()
    }

    /// Snapshot of the send pool counters.
    pub fn stats_send(&self) -> PoolStats {
        self.shared.send.stats()
    }

    /// The address the listener is currently bound to. `None` before
    /// `start`, after `stop` and while a rebind is in progress.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.bound.lock().unwrap()
    }

    /// Number of currently registered clients.
    pub fn active_connections(&self) -> usize {
        self.shared.clients.lock().unwrap().len()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

/// The accept task. Binds on demand, accepts until shutdown, applies the
/// drop-connections flag and the rate limiter, and hands sockets to
/// `Shared::join`.
async fn accept_loop(
    shared: Arc<Shared>,
    trace_id: String,
    ready_tx: oneshot::Sender<io::Result<SocketAddr>>,
) {
    // Subscribing before readiness is signalled guarantees a later stop
    // is observed.
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    let mut ready = Some(ready_tx);
    let mut listener: Option<TcpListener> = None;

    // Only this task reads or writes the accept timestamp.
    let mut last_accepted: Option<Instant> = None;

    loop {
        if listener.is_none() {
            match TcpListener::bind(shared.resolved).await {
                Ok(l) => {
                    let local = l.local_addr().unwrap_or(shared.resolved);
                    *shared.bound.lock().unwrap() = Some(local);
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(local));
                    }
                    shared.event(&trace_id, "accept", &format!("Waiting For Connections : {local}"));
                    listener = Some(l);
                }
                Err(e) => {
                    // The very first bind decides whether start succeeds.
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(e));
                        return;
                    }
                    shared.event(&trace_id, "accept", &format!("ERROR : rebind : {e}"));
                    tokio::select! {
                        _ = tokio::time::sleep(REBIND_BACKOFF) => continue,
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }
        }

        let Some(l) = listener.as_ref() else { continue };

        let accepted = tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = l.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                if shared.drop_conns.load(Ordering::Acquire) {
                    shared.event(&trace_id, "accept", &format!("Dropping connection : {peer}"));
                    continue;
                }

                if let Some(limit) = &shared.config.rate_limit {
                    let spacing = limit();
                    let now = Instant::now();
                    if let Some(last) = last_accepted {
                        if now < last + spacing {
                            shared.event(
                                &trace_id,
                                "accept",
                                &format!("Rate limited : {peer} : spacing {spacing:?}"),
                            );
                            continue;
                        }
                    }
                    last_accepted = Some(now);
                }

                shared.join(&trace_id, stream, peer).await;
            }
            Err(e) => {
                if shared.shutting_down.load(Ordering::Acquire) {
                    break;
                }
                match classify_accept_error(&e) {
                    NetErrorKind::Transient => {
                        shared.event(&trace_id, "accept", &format!("ERROR : {e}"));
                    }
                    NetErrorKind::Permanent => {
                        shared.event(&trace_id, "accept", &format!("ERROR : rebinding listener : {e}"));
                        listener = None;
                        *shared.bound.lock().unwrap() = None;
                    }
                }
            }
        }
    }

    *shared.bound.lock().unwrap() = None;
    shared.event(&trace_id, "accept", "Shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetType;
    use crate::handler::{ConnBinder, ConnReader, ConnWriter, Request};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    struct NoopTask;

    #[async_trait]
    impl crate::pool::Task for NoopTask {
        async fn run(self: Box<Self>, _trace_id: &str, _worker_id: usize) {}
    }

    struct SplitBinder;

    #[async_trait]
    impl ConnBinder for SplitBinder {
        async fn bind(&self, _trace_id: &str, stream: TcpStream) -> (ConnReader, ConnWriter) {
            let (r, w) = stream.into_split();
            (Box::new(r), Box::new(w))
        }
    }

    /// Parks inside bind until released, pinning a join mid-flight.
    struct GatedBinder {
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl ConnBinder for GatedBinder {
        async fn bind(&self, _trace_id: &str, stream: TcpStream) -> (ConnReader, ConnWriter) {
            let _permit = self.gate.acquire().await.unwrap();
            let (r, w) = stream.into_split();
            (Box::new(r), Box::new(w))
        }
    }

    struct ChunkRequests {
        seen: mpsc::UnboundedSender<Request>,
    }

    #[async_trait]
    impl RequestHandler for ChunkRequests {
        async fn read(
            &self,
            _trace_id: &str,
            _addr: SocketAddr,
            reader: &mut ConnReader,
        ) -> io::Result<Option<Bytes>> {
            let mut buf = vec![0u8; 4096];
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            buf.truncate(n);
            Ok(Some(Bytes::from(buf)))
        }

        async fn process(&self, _trace_id: &str, request: Request) {
            let _ = self.seen.send(request);
        }
    }

    struct RawResponses;

    #[async_trait]
    impl ResponseHandler for RawResponses {
        async fn write(
            &self,
            _trace_id: &str,
            response: &Response,
            writer: &mut ConnWriter,
        ) -> io::Result<()> {
            writer.write_all(&response.data).await?;
            writer.flush().await
        }
    }

    fn test_config(seen: mpsc::UnboundedSender<Request>) -> Config {
        Config::new(
            NetType::Tcp4,
            "127.0.0.1:0",
            Arc::new(SplitBinder),
            Arc::new(ChunkRequests { seen }),
            Arc::new(RawResponses),
        )
    }

    async fn started_manager() -> (Manager, SocketAddr, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Manager::new("test", "mgr", test_config(tx)).unwrap();
        manager.start("test").await.unwrap();
        let addr = manager.local_addr().unwrap();
        (manager, addr, rx)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(5)).await;
        }
        false
    }

    async fn read_closed(stream: &mut TcpStream) -> bool {
        let mut buf = [0u8; 8];
        match timeout(Duration::from_secs(2), stream.read(&mut buf)).await {
            Ok(Ok(0)) => true,
            Ok(Err(_)) => true,
            _ => false,
        }
    }

    #[test]
    fn test_classify_accept_errors() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
            io::ErrorKind::WouldBlock,
            io::ErrorKind::TimedOut,
        ] {
            assert_eq!(
                classify_accept_error(&io::Error::from(kind)),
                NetErrorKind::Transient
            );
        }

        assert_eq!(
            classify_accept_error(&io::Error::from(io::ErrorKind::PermissionDenied)),
            NetErrorKind::Permanent
        );
    }

    #[tokio::test]
    async fn test_start_twice_errors() {
        let (manager, _, _rx) = started_manager().await;

        let err = manager.start("test").await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyStarted));

        manager.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_lifecycle_errors() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = Manager::new("test", "mgr", test_config(tx)).unwrap();

        let err = manager.stop("test").await.unwrap_err();
        assert!(matches!(err, ManagerError::NotStarted));

        manager.start("test").await.unwrap();
        manager.stop("test").await.unwrap();

        let err = manager.stop("test").await.unwrap_err();
        assert!(matches!(err, ManagerError::NotStarted));

        // No restart after stop.
        let err = manager.start("test").await.unwrap_err();
        assert!(matches!(err, ManagerError::Stopped));
    }

    #[tokio::test]
    async fn test_bind_failure_surfaces_from_start() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (holder, _, _hold_rx) = started_manager().await;
        let taken = holder.local_addr().unwrap();

        let mut config = test_config(tx);
        config.addr = taken.to_string();
        let manager = Manager::new("test", "mgr2", config).unwrap();

        let err = manager.start("test").await.unwrap_err();
        assert!(matches!(err, ManagerError::Bind(_)));
        assert!(manager.local_addr().is_none());

        holder.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_addr_tracks_lifecycle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = Manager::new("test", "mgr", test_config(tx)).unwrap();
        assert!(manager.local_addr().is_none());

        manager.start("test").await.unwrap();
        let addr = manager.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        manager.stop("test").await.unwrap();
        assert!(manager.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_address() {
        let (manager, _, _rx) = started_manager().await;

        let target: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let err = manager
            .dispatch("test", Response::new(target, Bytes::from_static(b"X")))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotConnected(a) if a == target));

        // Nothing reached the send pool.
        assert_eq!(manager.stats_send().executed, 0);

        manager.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_request_flow() {
        let (manager, addr, mut rx) = started_manager().await;

        let mut conn = TcpStream::connect(addr).await.unwrap();
        let local = conn.local_addr().unwrap();
        conn.write_all(b"PING").await.unwrap();

        let request = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.addr, local);
        assert_eq!(&request.data[..], b"PING");
        assert_eq!(request.length, 4);
        assert!(!request.is_ipv6);

        let m = &manager;
        assert!(wait_until(|| m.stats_recv().executed == 1).await);

        manager.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_response_flow_runs_completion_once() {
        let (manager, addr, _rx) = started_manager().await;

        let mut conn = TcpStream::connect(addr).await.unwrap();
        let local = conn.local_addr().unwrap();
        let m = &manager;
        assert!(wait_until(|| m.active_connections() == 1).await);

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        let response = Response::new(local, Bytes::from_static(b"PONG")).with_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.dispatch("test", response).await.unwrap();

        let mut buf = [0u8; 4];
        timeout(Duration::from_secs(2), conn.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"PONG");

        let seen = Arc::clone(&completions);
        assert!(wait_until(|| seen.load(Ordering::SeqCst) == 1).await);
        assert_eq!(manager.stats_send().executed, 1);

        manager.stop("test").await.unwrap();
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = Manager::new("test", "mgr", test_config(tx)).unwrap();

        // Scratch listener supplies real accepted sockets for join.
        let scratch = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let scratch_addr = scratch.local_addr().unwrap();

        let mut peer1 = TcpStream::connect(scratch_addr).await.unwrap();
        let (sock1, _) = scratch.accept().await.unwrap();
        let mut peer2 = TcpStream::connect(scratch_addr).await.unwrap();
        let (sock2, _) = scratch.accept().await.unwrap();

        let fake: SocketAddr = "10.0.0.5:5555".parse().unwrap();
        manager.shared.join("test", sock1, fake).await;
        assert_eq!(manager.active_connections(), 1);

        manager.shared.join("test", sock2, fake).await;
        assert_eq!(manager.active_connections(), 1);

        // The rejected socket was dropped, its peer sees a close.
        assert!(read_closed(&mut peer2).await);

        // Closing the surviving peer unwinds its pipeline.
        let _ = peer1.shutdown().await;
        drop(peer1);
        let m = &manager;
        assert!(wait_until(|| m.active_connections() == 0).await);
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_accepts() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = test_config(tx);
        config.rate_limit = Some(Arc::new(|| Duration::from_millis(100)));

        let manager = Manager::new("test", "mgr", config).unwrap();
        manager.start("test").await.unwrap();
        let addr = manager.local_addr().unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        let m = &manager;
        assert!(wait_until(|| m.active_connections() == 1).await);

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert!(read_closed(&mut second).await);
        assert_eq!(manager.active_connections(), 1);

        sleep(Duration::from_millis(300)).await;
        let _third = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| m.active_connections() == 2).await);

        manager.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_connections_flag() {
        let (manager, addr, _rx) = started_manager().await;

        manager.drop_connections("test", true);
        let mut rejected = TcpStream::connect(addr).await.unwrap();
        assert!(read_closed(&mut rejected).await);
        assert_eq!(manager.active_connections(), 0);

        manager.drop_connections("test", false);
        let _accepted = TcpStream::connect(addr).await.unwrap();
        let m = &manager;
        assert!(wait_until(|| m.active_connections() == 1).await);

        manager.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_closes_all_clients() {
        let (manager, addr, _rx) = started_manager().await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();
        let m = &manager;
        assert!(wait_until(|| m.active_connections() == 2).await);

        manager.stop("test").await.unwrap();

        assert!(read_closed(&mut a).await);
        assert!(read_closed(&mut b).await);
        assert_eq!(manager.active_connections(), 0);
        assert_eq!(manager.stats_recv().active, 0);
        assert_eq!(manager.stats_send().active, 0);

        // The port is free again once the manager is down.
        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_stop_sweeps_connection_registered_during_shutdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut config = test_config(tx);
        config.binder = Arc::new(GatedBinder {
            gate: Arc::clone(&gate),
        });

        let manager = Arc::new(Manager::new("test", "mgr", config).unwrap());
        manager.start("test").await.unwrap();
        let addr = manager.local_addr().unwrap();

        let mut conn = TcpStream::connect(addr).await.unwrap();

        // Let the accept task park inside the binder.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.active_connections(), 0);

        let stopper = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.stop("test").await })
        };
        sleep(Duration::from_millis(50)).await;

        // Registration completes while stop is already snapshotting.
        gate.add_permits(1);

        timeout(Duration::from_secs(2), stopper)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(manager.active_connections(), 0);
        assert!(read_closed(&mut conn).await);
    }

    #[tokio::test]
    async fn test_external_pools_survive_stop() {
        let recv = Arc::new(
            Pool::new("test", "ext-recv", PoolConfig { min_workers: 1, max_workers: 2 }).unwrap(),
        );
        let send = Arc::new(
            Pool::new("test", "ext-send", PoolConfig { min_workers: 1, max_workers: 2 }).unwrap(),
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = test_config(tx);
        config.recv_pool = Some(Arc::clone(&recv));
        config.send_pool = Some(Arc::clone(&send));

        let manager = Manager::new("test", "mgr", config).unwrap();
        manager.start("test").await.unwrap();
        manager.stop("test").await.unwrap();

        // Still accepting work after the manager is gone.
        assert!(recv.submit("test", Box::new(NoopTask)).await.is_ok());
        assert!(send.submit("test", Box::new(NoopTask)).await.is_ok());

        recv.shutdown("test").await;
        send.shutdown("test").await;
    }
}
