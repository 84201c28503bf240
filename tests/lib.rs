//! Integration tests for concord
//!
//! This crate contains integration tests that verify the concord crates work
//! together correctly.
//!
//! ## Test Modules
//!
//! - `integration_test` - Consensus resolution properties over mock backends
//! - `http_integration` - HTTP backends against in-process mock nodes
//! - `config_integration` - Configuration loading and backend construction
