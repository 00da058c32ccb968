//! Shared tracing setup for the comeback binaries.

mod tracing;

pub use crate::tracing::{init_tracing, init_tracing_with};
