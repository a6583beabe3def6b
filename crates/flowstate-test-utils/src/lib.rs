//! Testing utilities for the Flowstate engine.
//!
//! This crate provides a flow testing harness, mocks and fakes of the
//! persister interface, assertion helpers for flow states, and tracing setup
//! for tests.

pub mod assertions;
pub mod harness;
pub mod implementations;
pub mod mocks;
pub mod util;

/// Re-export commonly used types for convenience
pub use mockall;

pub use harness::FlowTestingUtils;
pub use implementations::RecordingPersister;
pub use mocks::{mock_persister, MockPersistenceBackend};
pub use util::init_test_tracing;
