//! Shared test utilities for docflow integration tests.
//!
//! This module provides:
//! - `StoreHarness` for file-backed stores in isolated temp directories
//! - Builders for the records the pipeline services write

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::StoreHarness;
