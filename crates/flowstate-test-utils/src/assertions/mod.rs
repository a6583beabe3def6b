//! Assertion utilities for validating flow states.

pub mod flow_state;

pub use flow_state::*;
