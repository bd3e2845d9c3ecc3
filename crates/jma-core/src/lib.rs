//! Core types and trait definitions for the JMA forecast pipeline.
//!
//! No HTTP or database dependencies live here. The crate owns the area
//! taxonomy and the upstream document model. It also holds the normalizer that
//! turns documents into fact rows, and the [`store::ForecastStore`] abstraction.

pub mod area;
pub mod document;
pub mod error;
pub mod forecast;
pub mod normalize;
pub mod store;

pub use error::{Error, Result};
