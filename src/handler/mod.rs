//! Handler Contracts Module
//!
//! This module defines the three strategy interfaces a caller supplies to
//! turn a raw accepted socket into application traffic, plus the message
//! shapes that flow through the worker pools.
//!
//! ## Roles
//!
//! - [`ConnBinder`]: one-time adaptation of an accepted socket into a
//!   reader and a writer (split, buffer, or wrap, whatever the protocol
//!   needs).
//! - [`RequestHandler`]: reads exactly one logical request per call from
//!   the bound reader, and processes parsed requests on a receive-pool
//!   worker.
//! - [`ResponseHandler`]: serializes a [`Response`] to the bound writer on
//!   a send-pool worker.
//!
//! Framing, serialization and TLS are entirely the handlers' business;
//! the manager moves opaque bytes.
//!
//! ## Ordering
//!
//! Reads on one connection are strictly sequential, but once dispatched to
//! the shared pools, processing and writing may interleave across workers.
//! Handlers needing per-connection ordering must serialize themselves.

pub mod message;
pub mod traits;

// Re-export commonly used types
pub use message::{Request, Response};
pub use traits::{ConnBinder, ConnReader, ConnWriter, RequestHandler, ResponseHandler};
