//! Handler trait definitions.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::message::{Request, Response};

/// The read half a [`ConnBinder`] produces for a connection.
pub type ConnReader = Box<dyn AsyncRead + Send + Unpin>;

/// The write half a [`ConnBinder`] produces for a connection.
pub type ConnWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Binds an accepted socket to a reader and writer.
///
/// Called once per accepted connection, before the connection is
/// registered. Implementations typically split the stream and may layer
/// buffering or transport wrapping on either half. Must not block
/// indefinitely.
#[async_trait]
pub trait ConnBinder: Send + Sync + 'static {
    async fn bind(&self, trace_id: &str, stream: TcpStream) -> (ConnReader, ConnWriter);
}

/// Reads and processes inbound requests.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Reads exactly one logical request off the wire.
    ///
    /// Called in a loop on the connection's own read pipeline.
    /// `Ok(Some(data))` yields one request; `Ok(None)` signals a clean
    /// end-of-stream; `Err` signals a non-recoverable read error. The
    /// latter two terminate this connection's pipeline, and only this
    /// connection's.
    async fn read(
        &self,
        trace_id: &str,
        addr: SocketAddr,
        reader: &mut ConnReader,
    ) -> io::Result<Option<Bytes>>;

    /// Handles one parsed request.
    ///
    /// Called on a worker from the receive pool. May run concurrently
    /// with `process` calls for other requests, including later requests
    /// from the same connection.
    async fn process(&self, trace_id: &str, request: Request);
}

/// Serializes outbound responses.
#[async_trait]
pub trait ResponseHandler: Send + Sync + 'static {
    /// Writes one response to the bound writer.
    ///
    /// Called on a worker from the send pool. The response's completion
    /// callback, if any, runs on the same worker immediately afterwards.
    async fn write(
        &self,
        trace_id: &str,
        response: &Response,
        writer: &mut ConnWriter,
    ) -> io::Result<()>;
}
