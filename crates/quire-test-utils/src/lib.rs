// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Quire webhook engine.
//!
//! Provides:
//! - [`MemoryStore`]: in-memory subscription and delivery repositories plus a
//!   recording audit sink, with per-subscription failure injection.
//! - [`MemoryQueue`]: in-memory `webhook/deliver` queue implementing both the
//!   producer and consumer sides.
//! - [`TestHarness`]: the whole engine wired over the in-memory collaborators.

pub mod harness;
pub mod memory;
pub mod queue;

pub use harness::{TEST_MASTER_KEY, TestHarness, TestHarnessBuilder};
pub use memory::MemoryStore;
pub use queue::MemoryQueue;
