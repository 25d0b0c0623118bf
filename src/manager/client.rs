//! Per-connection state and the read pipeline task.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::handler::{ConnReader, ConnWriter, Request};
use crate::manager::dispatch::ProcessRequest;
use crate::manager::server::Shared;

/// One registered connection.
///
/// The client owns the write half behind an async mutex so send-pool
/// workers can share it, while the read half belongs exclusively to the
/// pipeline task.
pub(crate) struct Client {
    addr: SocketAddr,
    writer: Mutex<ConnWriter>,
    shutdown_tx: watch::Sender<bool>,
    pipeline: StdMutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub(crate) fn new(addr: SocketAddr, writer: ConnWriter) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            addr,
            writer: Mutex::new(writer),
            shutdown_tx,
            pipeline: StdMutex::new(None),
        })
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) async fn writer(&self) -> MutexGuard<'_, ConnWriter> {
        self.writer.lock().await
    }

    /// Spawns the read pipeline for this client. Called exactly once,
    /// right after the client is registered.
    pub(crate) fn start_pipeline(
        self: &Arc<Self>,
        shared: Arc<Shared>,
        reader: ConnReader,
        trace_id: String,
    ) {
        let handle = tokio::spawn(read_pipeline(Arc::clone(self), shared, reader, trace_id));
        *self.pipeline.lock().unwrap() = Some(handle);
    }

    /// Signals the pipeline to stop and waits for it to exit. Safe to
    /// call more than once.
    pub(crate) async fn drop_conn(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.pipeline.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Closes the write half. The read half dies with the pipeline task,
    /// so this finishes tearing the socket down.
    pub(crate) async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Reads requests off the connection until EOF, a read error, a failed
/// pool submit or a shutdown signal, then removes the client from the
/// registry. Removal always runs, whichever way the loop ends.
async fn read_pipeline(
    client: Arc<Client>,
    shared: Arc<Shared>,
    mut reader: ConnReader,
    trace_id: String,
) {
    let mut shutdown_rx = client.shutdown_tx.subscribe();

    loop {
        // Catches a drop signal sent before this task subscribed.
        if *shutdown_rx.borrow_and_update() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = shared.request_handler().read(&trace_id, client.addr(), &mut reader) => {
                match result {
                    Ok(Some(data)) => {
                        let request = Request::new(client.addr(), data);
                        let task = ProcessRequest::new(Arc::clone(&shared), request);
                        if let Err(e) = shared.recv_pool().submit(&trace_id, Box::new(task)).await {
                            shared.event(&trace_id, "read", &format!("ERROR : {} : submit : {e}", client.addr()));
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        shared.event(&trace_id, "read", &format!("ERROR : {} : {e}", client.addr()));
                        break;
                    }
                }
            }
        }
    }

    shared.remove(&trace_id, client.addr()).await;
}
