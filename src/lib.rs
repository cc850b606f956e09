//! Part-processing coordination pipeline.
//!
//! Splits a source document into independently convertible parts, fans the
//! parts out over a message channel to a conversion worker pool, tracks
//! per-part completion idempotently, and reassembles the converted parts in
//! part-number order into one output document.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
