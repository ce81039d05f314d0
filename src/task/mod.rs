//! Task lifecycle, persistence, and sandbox scheduling.
//!
//! A task carries a prompt from submission to a terminal status. The
//! scheduler requests one sandbox per task through the
//! [`crate::sandbox::ports::SandboxGateway`], keyed by the task id, and
//! reconciles the task status with what the gateway observes. Every status
//! write is a compare-and-set, so a user cancelling a task always wins over a
//! scheduler that read the task earlier.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Lifecycle and scheduling services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
