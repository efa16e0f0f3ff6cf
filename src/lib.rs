//! PagePilot library crate
//!
//! Exposes the extraction, completion and orchestration modules so the CLI
//! and external tooling can drive the pipeline without going through
//! process startup.

pub mod channel;
pub mod config;
pub mod extract;
pub mod llm;
pub mod orchestrator;
pub mod page;
pub mod populate;
pub mod router;
pub mod snapshot;
pub mod store;
pub mod util;

#[cfg(test)]
pub mod testing;
