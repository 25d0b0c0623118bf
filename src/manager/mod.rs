//! Connection Manager Module
//!
//! The manager owns the listener, the client registry and both worker
//! pools. It is the crate's single entry point.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Manager                              │
//! │                                                             │
//! │  ┌─────────────┐   accept   ┌──────────────────────────┐   │
//! │  │ accept task │───────────>│  registry                │   │
//! │  │ (rebinds on │            │  addr -> Client          │   │
//! │  │  permanent  │            └───────────┬──────────────┘   │
//! │  │  errors)    │                        │ one per client   │
//! │  └─────────────┘                        ▼                  │
//! │                            ┌──────────────────────────┐    │
//! │                            │ read pipeline task       │    │
//! │                            │ RequestHandler::read     │    │
//! │                            └───────────┬──────────────┘    │
//! │                                        │ submit            │
//! │                                        ▼                   │
//! │  ┌──────────────┐          ┌──────────────────────────┐    │
//! │  │  send pool   │          │       recv pool          │    │
//! │  │ Response ->  │          │ Request ->               │    │
//! │  │ write+notify │          │ RequestHandler::process  │    │
//! │  └──────▲───────┘          └──────────────────────────┘    │
//! │         │ dispatch(response)                               │
//! └─────────┼──────────────────────────────────────────────────┘
//!           │
//!        caller
//! ```
//!
//! ## Concurrency Discipline
//!
//! Exactly one accept task per manager and one read-pipeline task per
//! registered client. The registry lock and the bound-address lock are
//! independent and never held across I/O. The drop-connections and
//! shutting-down flags are lock-free booleans. The last-accepted timestamp
//! is a local of the accept task: single writer, single reader by
//! construction.

pub mod client;
pub mod dispatch;
pub mod server;

// Re-export commonly used types
pub use server::{Manager, ManagerError};
