//! Integration tests for the OPC-UA security gateway
//!
//! These tests drive the whole gateway through the loopback transport and
//! the simulated backend from `uagw-stack`; no network or OpenSSL needed.
//!
//! ```bash
//! cargo test -p uagw-tests
//! ```
//!
//! # Test Structure
//!
//! - `gateway_e2e_test.rs` - Startup, address-space modes, shutdown
//! - `auth_e2e_test.rs` - Session admission: credentials, anonymous,
//!   certificates and channel security

// This crate only contains tests, no library code
