//! Request and response message shapes.
//!
//! Both are ephemeral: a `Request` is created by a read pipeline, consumed
//! by one receive-pool worker and discarded; a `Response` is created by a
//! caller of [`Manager::dispatch`](crate::Manager::dispatch) and consumed
//! by one send-pool worker. Neither carries a reference back into the
//! manager; the work item built at submission time carries the handles it
//! needs, so a message outliving its connection degrades to a logged
//! failed write rather than a dangling pointer.

use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

use bytes::Bytes;

/// One logical request read from a client connection.
#[derive(Debug, Clone)]
pub struct Request {
    /// Remote address the request was read from.
    pub addr: SocketAddr,

    /// Whether the originating address is IPv6.
    pub is_ipv6: bool,

    /// Wall-clock receipt time.
    pub read_at: SystemTime,

    /// The request payload.
    pub data: Bytes,

    /// Payload length in bytes.
    pub length: usize,
}

impl Request {
    pub fn new(addr: SocketAddr, data: Bytes) -> Self {
        Self {
            addr,
            is_ipv6: addr.is_ipv6(),
            read_at: SystemTime::now(),
            length: data.len(),
            data,
        }
    }
}

/// Callback invoked after a response has been handed to its handler.
///
/// `Sync` is required so a `&Response` can be held across await points
/// inside a handler's write future.
pub type CompleteFn = Box<dyn FnOnce(&Response) + Send + Sync>;

/// One outbound response targeting a registered client connection.
pub struct Response {
    /// Remote address of the target connection.
    pub addr: SocketAddr,

    /// The response payload.
    pub data: Bytes,

    /// Payload length in bytes.
    pub length: usize,

    /// Optional completion callback, invoked exactly once on the worker
    /// that performed the write, after the write attempt.
    pub complete: Option<CompleteFn>,
}

impl Response {
    pub fn new(addr: SocketAddr, data: Bytes) -> Self {
        Self {
            addr,
            length: data.len(),
            data,
            complete: None,
        }
    }

    /// Attaches a completion callback.
    pub fn with_complete(mut self, f: impl FnOnce(&Response) + Send + Sync + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("addr", &self.addr)
            .field("length", &self.length)
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_derives_fields_from_payload() {
        let addr: SocketAddr = "10.0.0.5:5555".parse().unwrap();
        let request = Request::new(addr, Bytes::from_static(b"PING"));

        assert_eq!(request.addr, addr);
        assert!(!request.is_ipv6);
        assert_eq!(request.length, 4);
        assert_eq!(request.data, Bytes::from_static(b"PING"));
    }

    #[test]
    fn test_request_flags_ipv6() {
        let addr: SocketAddr = "[::1]:5555".parse().unwrap();
        let request = Request::new(addr, Bytes::new());
        assert!(request.is_ipv6);
    }

    #[test]
    fn test_messages_are_send_and_sync() {
        // Both cross task boundaries, and write futures hold &Response
        // across await points.
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Request>();
        assert_send_sync::<Response>();
    }

    #[test]
    fn test_response_with_complete() {
        let addr: SocketAddr = "10.0.0.5:5555".parse().unwrap();
        let response = Response::new(addr, Bytes::from_static(b"PONG"));
        assert!(response.complete.is_none());
        assert_eq!(response.length, 4);

        let response = response.with_complete(|_| {});
        assert!(response.complete.is_some());
    }
}
