//! Sandbox provider adapters.

pub mod http;
pub mod memory;

pub use http::HttpSandboxProvider;
pub use memory::{InMemorySandboxProvider, ProviderCallCounts};
