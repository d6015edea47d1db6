//! Common test utilities and infrastructure
//!
//! This module provides shared fixtures, in-memory collaborators and an
//! orchestrator builder used across the agent test suites.

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{MemoryQueuePool, OrchestratorBuilder, RecordingConnector, TestAgent, TestHelpers};
