//! JMA forecast ingestion: area codes in, stored fact rows out.
//!
//! A [`Pipeline`] drives each area code through fetch → normalize → store.
//! Fetch failures are scoped to their area and collected in the
//! [`RunSummary`]; storage failures abort the run.

pub mod config;
pub mod error;
pub mod pipeline;

pub use crate::{
  config::IngestConfig,
  error::{Error, Result},
  pipeline::{AreaOutcome, AreaReport, Pipeline, RunSummary, source_codes},
};

#[cfg(test)]
mod tests;
