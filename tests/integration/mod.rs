//! Integration tests for netlabel
//!
//! This module contains integration tests that drive the labeling engine
//! and the control plane through their public APIs.
//!
//! # Test Organization
//!
//! - `scenarios`: end-to-end outbound and inbound labeling decisions
//! - `properties`: table invariants under operation sequences
//! - `reclamation`: deferred release under concurrent readers and writers
//! - `ipc`: netlabeld control socket driven by the client
//!
//! # Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration_tests
//!
//! # Run specific test module
//! cargo test --test integration_tests scenarios
//! ```
//!
//! # Test Requirements
//!
//! - No network access or privileges are needed
//! - Interfaces come from a fixed name table, never from the host

pub mod common;
pub mod ipc;
pub mod properties;
pub mod reclamation;
pub mod scenarios;
