pub mod checker;
/// Monitoring module - the pending-target polling engine
///
/// This module is responsible for:
/// - Probing targets over HTTP
/// - Tracking which targets are still pending
/// - Running rounds until every target is up
pub mod engine;
pub mod pending;
pub mod types;

#[cfg(test)]
mod tests;

pub use checker::HttpProbe;
pub use engine::{EngineExit, EngineState, PollingEngine};
pub use pending::PendingSet;
