//! Testability helpers shared by unit tests, integration tests and the CLI.
//!
//! Synthetic signals live here so tests can drive the real pipeline with
//! deterministic input instead of live hardware.

pub mod signals;
