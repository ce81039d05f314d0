//! Port contracts for sandbox orchestration.
//!
//! [`SandboxProvider`] is implemented per backend; [`SandboxGateway`] is the
//! contract the rest of the system depends on.

pub mod gateway;
pub mod provider;

pub use gateway::SandboxGateway;
pub use provider::{ObservedState, ProviderError, ProviderResult, SandboxProvider};

#[cfg(test)]
pub use gateway::MockSandboxGateway;
#[cfg(test)]
pub use provider::MockSandboxProvider;
