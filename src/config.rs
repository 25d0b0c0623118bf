//! Manager Configuration
//!
//! This module defines the configuration consumed once at manager
//! construction: the network type and listen address, sizing for the two
//! worker pools (or externally-owned pools in their place), the pluggable
//! handler references, an optional connection rate limiter, and an optional
//! event callback for structured diagnostics.
//!
//! ## Pool Ownership
//!
//! A manager either creates and owns its receive/send pools (sized from
//! `recv_min_workers`..`send_max_workers`) or adopts caller-supplied pools.
//! Supplying pools is all-or-nothing: handing over exactly one of the two is
//! a configuration error. Ownership decides who shuts the pools down: an
//! owned pool is drained by [`Manager::stop`](crate::Manager::stop), an
//! adopted one is left to its owner.
//!
//! ## Rate Limiting
//!
//! The rate limiter is a closure returning the minimum spacing required
//! between accepted connections. Any connection arriving earlier than
//! `last_accepted + limit()` is closed without registration. No limiter
//! means unlimited.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::handler::{ConnBinder, RequestHandler, ResponseHandler};
use crate::pool::Pool;

/// Default minimum worker count for an owned pool.
pub const DEFAULT_MIN_WORKERS: usize = 1;

/// Default maximum worker count for an owned pool.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// A function yielding the minimum required spacing between accepted
/// connections.
pub type RateLimit = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Callback for structured diagnostic events.
///
/// Invoked as `event(trace_id, category, message)` where `category` is one
/// of `"accept"`, `"join"`, `"remove"`, `"read"` or `"write"`. Events are
/// also emitted through `tracing`, so the callback is purely additive.
pub type EventFn = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// The network address family the listener binds with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetType {
    /// Either address family, first resolved address wins.
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl FromStr for NetType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "tcp" => Ok(NetType::Tcp),
            "tcp4" => Ok(NetType::Tcp4),
            "tcp6" => Ok(NetType::Tcp6),
            other => Err(ConfigError::InvalidNetType(other.to_string())),
        }
    }
}

impl fmt::Display for NetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetType::Tcp => write!(f, "tcp"),
            NetType::Tcp4 => write!(f, "tcp4"),
            NetType::Tcp6 => write!(f, "tcp6"),
        }
    }
}

/// Errors surfaced while validating a [`Config`] or resolving its address.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The network type string is not one of `tcp`, `tcp4`, `tcp6`.
    #[error("invalid net type: {0:?}")]
    InvalidNetType(String),

    /// Pool sizing must satisfy `1 <= min <= max`.
    #[error("invalid pool sizing: min {min}, max {max}")]
    InvalidPoolSizing { min: usize, max: usize },

    /// Externally-owned pools must be supplied as a pair or not at all.
    #[error("externally-owned pools must be supplied for both recv and send")]
    MismatchedPools,

    /// The listen address failed to resolve.
    #[error("unable to resolve {addr:?}: {source}")]
    Unresolvable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The address resolved, but not to the requested family.
    #[error("no {net_type} address found for {addr:?}")]
    NoMatchingAddress { net_type: NetType, addr: String },
}

/// Configuration for a [`Manager`](crate::Manager), consumed at
/// construction.
///
/// The handler references are required; everything else has a sensible
/// default set by [`Config::new`] and can be adjusted field-by-field.
#[derive(Clone)]
pub struct Config {
    /// Address family to listen with.
    pub net_type: NetType,

    /// Listen address, e.g. `"127.0.0.1:7000"`.
    pub addr: String,

    /// Minimum workers for an owned receive pool.
    pub recv_min_workers: usize,

    /// Maximum workers for an owned receive pool.
    pub recv_max_workers: usize,

    /// Minimum workers for an owned send pool.
    pub send_min_workers: usize,

    /// Maximum workers for an owned send pool.
    pub send_max_workers: usize,

    /// Externally-owned receive pool. Must be paired with `send_pool`.
    pub recv_pool: Option<Arc<Pool>>,

    /// Externally-owned send pool. Must be paired with `recv_pool`.
    pub send_pool: Option<Arc<Pool>>,

    /// Optional minimum spacing between accepted connections.
    pub rate_limit: Option<RateLimit>,

    /// Binds an accepted socket to a reader and writer.
    pub binder: Arc<dyn ConnBinder>,

    /// Reads and processes inbound requests.
    pub request_handler: Arc<dyn RequestHandler>,

    /// Serializes outbound responses.
    pub response_handler: Arc<dyn ResponseHandler>,

    /// Optional structured event callback.
    pub event: Option<EventFn>,
}

impl Config {
    /// Creates a configuration with default pool sizing, no rate limiter,
    /// no external pools and no event callback.
    pub fn new(
        net_type: NetType,
        addr: impl Into<String>,
        binder: Arc<dyn ConnBinder>,
        request_handler: Arc<dyn RequestHandler>,
        response_handler: Arc<dyn ResponseHandler>,
    ) -> Self {
        Self {
            net_type,
            addr: addr.into(),
            recv_min_workers: DEFAULT_MIN_WORKERS,
            recv_max_workers: DEFAULT_MAX_WORKERS,
            send_min_workers: DEFAULT_MIN_WORKERS,
            send_max_workers: DEFAULT_MAX_WORKERS,
            recv_pool: None,
            send_pool: None,
            rate_limit: None,
            binder,
            request_handler,
            response_handler,
            event: None,
        }
    }

    /// Validates pool sizing and pool-ownership consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.recv_pool, &self.send_pool) {
            (Some(_), Some(_)) => return Ok(()),
            (None, None) => {}
            _ => return Err(ConfigError::MismatchedPools),
        }

        for (min, max) in [
            (self.recv_min_workers, self.recv_max_workers),
            (self.send_min_workers, self.send_max_workers),
        ] {
            if min == 0 || max < min {
                return Err(ConfigError::InvalidPoolSizing { min, max });
            }
        }

        Ok(())
    }

    /// Resolves the configured address, honoring the address family.
    pub fn resolve(&self) -> Result<SocketAddr, ConfigError> {
        let addrs = self
            .addr
            .to_socket_addrs()
            .map_err(|source| ConfigError::Unresolvable {
                addr: self.addr.clone(),
                source,
            })?;

        let wanted = addrs.into_iter().find(|a| match self.net_type {
            NetType::Tcp => true,
            NetType::Tcp4 => a.is_ipv4(),
            NetType::Tcp6 => a.is_ipv6(),
        });

        wanted.ok_or_else(|| ConfigError::NoMatchingAddress {
            net_type: self.net_type,
            addr: self.addr.clone(),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("net_type", &self.net_type)
            .field("addr", &self.addr)
            .field("recv_min_workers", &self.recv_min_workers)
            .field("recv_max_workers", &self.recv_max_workers)
            .field("send_min_workers", &self.send_min_workers)
            .field("send_max_workers", &self.send_max_workers)
            .field("user_pools", &self.recv_pool.is_some())
            .field("rate_limit", &self.rate_limit.is_some())
            .finish_non_exhaustive()
    }
}
