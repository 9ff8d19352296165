//! Pro-rata stake allocation across sponsorships

pub mod engine;
pub mod plan;

pub use engine::{AllocationEngine, AllocationOutcome};
