//! Bridge transports and discovery.
//!
//! # Module Structure
//!
//! - `traits` - Trait abstractions for testability
//! - `client` - `BridgeClientImpl`: UDP fast path and JSON endpoints
//! - `discovery` - Broadcast and mDNS bridge discovery

pub mod client;
pub mod discovery;
pub mod traits;

// Re-export trait abstractions
pub use traits::{BridgeClient, BridgeDiscovery, BridgeHttp, FastPath};

// Re-export concrete implementations
pub use client::{BridgeClientImpl, TransportError, TransportResult};
pub use discovery::{DiscoveryError, DiscoveryMethod, DiscoveryResult, NetworkDiscovery};
