//! SENTINEL: multi-chain portfolio and strategy agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod agent;
pub mod chain;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod execution;
pub mod storage;
pub mod strategy;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
