//! Unit tests for the sandbox module.
//!
//! Domain tests cover value validation and the lifecycle table; service tests
//! drive the tracker, forwarder, and gateway against scripted providers.

mod support;
