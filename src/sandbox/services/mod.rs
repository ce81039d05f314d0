//! Gateway services layered over a sandbox provider.

mod forwarder;
mod gateway;
mod tracker;

pub use forwarder::ProxyForwarder;
pub use gateway::ProviderGateway;
pub use tracker::StatusTracker;
