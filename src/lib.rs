//! Conformance probing for OGC map, tile and coverage services (WMS, WMTS, OGC API EDR).

pub mod assertions;
pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fixtures;
pub mod report;
pub mod results;
pub mod service;

pub use engine::Session;
pub use error::{ProbeError, ProbeResult};
