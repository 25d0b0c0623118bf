//! # tcpgate - A Reusable TCP Connection Manager
//!
//! tcpgate accepts TCP connections, reads protocol-defined request frames
//! off each one, and processes requests and responses on bounded worker
//! pools. The protocol itself is plugged in by the caller through three
//! small contracts, so the same manager serves any framed TCP protocol.
//!
//! ## Features
//!
//! - **Pluggable protocol**: [`ConnBinder`], [`RequestHandler`] and
//!   [`ResponseHandler`] carry all protocol knowledge
//! - **Bounded concurrency**: fixed-size recv/send pools with bounded
//!   queues, so a flood of requests backpressures the sockets
//! - **Self-healing listener**: permanent accept errors trigger a rebind
//!   instead of killing the server
//! - **Operational controls**: connection rate limiting, an
//!   immediate-close toggle and per-pool counters
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                           Manager                              │
//! │                                                                │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐   │
//! │  │  Listener   │────>│  Registry   │────>│  Read Pipeline  │   │
//! │  │ (accept +   │     │ addr->Client│     │ (one task per   │   │
//! │  │  rebind)    │     └─────────────┘     │  connection)    │   │
//! │  └─────────────┘                         └────────┬────────┘   │
//! │                                                   │            │
//! │  ┌──────────────────────┐     ┌───────────────────▼─────────┐  │
//! │  │      send pool       │     │         recv pool           │  │
//! │  │ ResponseHandler::    │     │ RequestHandler::process     │  │
//! │  │ write + completion   │     │                             │  │
//! │  └──────────▲───────────┘     └─────────────────────────────┘  │
//! │             │ dispatch(Response)                               │
//! └─────────────┼──────────────────────────────────────────────────┘
//!               │
//!            caller
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tcpgate::{Config, Manager, NetType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tcpgate::ManagerError> {
//!     // EchoBinder / EchoRequests / EchoResponses implement the three
//!     // handler contracts for a byte-echo protocol.
//!     let config = Config::new(
//!         NetType::Tcp4,
//!         "127.0.0.1:7000",
//!         Arc::new(EchoBinder),
//!         Arc::new(EchoRequests),
//!         Arc::new(EchoResponses),
//!     );
//!
//!     let manager = Manager::new("main", "echo", config)?;
//!     manager.start("main").await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     manager.stop("main").await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: manager configuration, validation and address resolution
//! - [`pool`]: bounded async worker pools with counters
//! - [`handler`]: the pluggable protocol contracts plus [`Request`] and
//!   [`Response`]
//! - [`manager`]: the manager, its accept loop and the client registry
//!
//! ## Design Highlights
//!
//! ### Bounded Everything
//!
//! Both pools run a fixed set of workers over a bounded queue. Submitting
//! to a full queue waits, which stalls the read pipeline, which stops
//! reading the socket. Overload shows up as TCP backpressure instead of
//! unbounded memory growth.
//!
//! ### Single-Writer State
//!
//! The accept timestamp used for rate limiting lives on the accept task.
//! The registry and bound-address locks are held only for map and field
//! access, never across I/O.

pub mod config;
pub mod handler;
pub mod manager;
pub mod pool;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError, EventFn, NetType, RateLimit};
pub use handler::{
    ConnBinder, ConnReader, ConnWriter, Request, RequestHandler, Response, ResponseHandler,
};
pub use manager::{Manager, ManagerError};
pub use pool::{Pool, PoolConfig, PoolError, PoolStats, Task};

/// Version of tcpgate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
