//! Resilient access to the Canary historian.
//!
//! # Architecture
//!
//! - **transport**: the HTTP+JSON seam (`HistorianTransport`, `HttpTransport`)
//! - **resilience**: validation, circuit breaker, session tokens, retry, size guard
//! - **cache**: TTL + size-bounded LRU response cache
//! - **client**: typed historian operations composed from the two above
//! - **wire**: response decoding

pub mod cache;
pub mod client;
pub mod resilience;
pub mod transport;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{cache_key, CacheCategory, CacheStats, ResponseCache};
pub use client::{CanaryClient, DataRequest, Fetched};
pub use resilience::{
    BreakerSnapshot, CircuitState, Guarded, HealthSnapshot, Operation, ResilientCore, SizeGuard,
};
pub use transport::{HistorianTransport, HttpTransport, TransportError};
pub use wire::{Aggregate, BrowseNode, DataPage, TagProperties};
