//! Step count derivation from raw sensor readings.

pub mod aggregator;

pub use aggregator::{ChangeEvent, StepAggregator};
