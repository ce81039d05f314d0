//! Step definitions for sandbox gateway scenarios.

mod given;
mod then;
mod when;
pub mod world;
