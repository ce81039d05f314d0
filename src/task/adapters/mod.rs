//! Adapter implementations for task and file repository ports.

pub mod memory;
pub mod postgres;

mod logging;

pub use logging::LoggingEventListener;
