//! Bounded Worker Pool Module
//!
//! A fixed set of worker tasks consuming submitted work items from a
//! bounded queue. The manager runs two of these: one for processing
//! received requests, one for serializing and writing responses.
//!
//! ## Architecture
//!
//! ```text
//!  submit(trace_id, task)
//!          │
//!          ▼
//!  ┌───────────────────┐      ┌──────────┐
//!  │  bounded queue    │─────>│ worker 0 │
//!  │  (tokio mpsc)     │─────>│ worker 1 │
//!  │                   │─────>│ ...      │
//!  └───────────────────┘─────>│ worker N │
//!                             └──────────┘
//! ```
//!
//! ## Backpressure
//!
//! `submit` awaits space in the queue rather than dropping work. A read
//! pipeline that submits faster than workers drain slows down instead of
//! silently losing requests from a live connection. Callers that must not
//! stall should size the pool and queue accordingly.
//!
//! ## Shutdown
//!
//! `shutdown` stops accepting new work, closes the queue, and blocks
//! until every worker task has drained the remaining items and exited.
//! Every submission that returned `Ok` is executed, including one racing
//! shutdown. Idempotent.

pub mod worker;

// Re-export commonly used types
pub use worker::{Pool, PoolConfig, PoolError, PoolStats, Task};
