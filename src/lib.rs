//! Caisson: sandbox orchestration gateway for agent tasks.
//!
//! Caisson gives each agent task its own isolated sandbox, keeps track of
//! whether that sandbox is still alive, and relays HTTP-shaped requests into
//! it. Callers see one gateway contract regardless of which sandbox provider
//! backs it.
//!
//! # Architecture
//!
//! Caisson follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, HTTP, memory)
//!
//! # Modules
//!
//! - [`sandbox`]: Sandbox creation, status tracking, and request proxying
//! - [`task`]: Task lifecycle, persistence, and sandbox scheduling
//! - [`config`]: TOML configuration with environment overrides
//! - [`telemetry`]: Structured logging setup

pub mod config;
pub mod sandbox;
pub mod task;
pub mod telemetry;
