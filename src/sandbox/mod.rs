//! Sandbox orchestration gateway.
//!
//! Creates sandboxes through a provider, tracks their observed lifecycle, and
//! proxies HTTP-shaped requests into them. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Gateway services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
