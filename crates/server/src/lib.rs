//! SiteMind ingestion server: wires the pipeline scheduler to an operational HTTP surface.

pub mod api;
pub mod metrics;
pub mod state;
