// src/analyze/mod.rs
//! Language-model stages: adapter, headline curation, reconciliation, reports.

pub mod ai_adapter;
pub mod curation;
pub mod reconcile;
pub mod report;
