//! Step definitions for task scheduling BDD scenarios.

mod given;
mod then;
mod when;
pub mod world;
