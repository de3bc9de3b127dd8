#![allow(dead_code)]

pub mod fakes;
pub mod harness;

// Re-export commonly used test utilities
pub use fakes::{FixedEmbedder, FlakyStore, HashEmbedder};
pub use harness::{shared, TestHarness};
