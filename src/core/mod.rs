// src/core/mod.rs

// Public interface of the scanning core. Callers construct a `Scanner` from
// an immutable `ScanConfig` plus a set of collaborators and receive frozen
// `ScanReport` values back.
pub mod cache;
pub mod config;
pub mod error;
pub mod knowledge_base;
pub mod models;
pub mod pipeline;

pub use pipeline::{Collaborators, ScanOutcome, Scanner};
