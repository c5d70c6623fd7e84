//! Tariff analytics for the water and sewer utilities of the Aburrá
//! valley municipalities.
//!
//! The crate is a pipeline over a single fact table of tariff
//! observations: load, filter to a selection tuple, then derive
//! forecasts, grouped indicators and geographic views from the filtered
//! rows. The HTTP surface in `main.rs` exposes each page payload as
//! JSON; everything in the library is framework-free and synchronous.

pub mod common;
pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod geo;
pub mod indicators;
pub mod pages;
pub mod seasonality;

pub use config::Settings;
pub use data::{FactCache, FactTable, Selection};
pub use error::{DashboardError, Result};
pub use forecast::{run_forecasts, ForecastReport, ModelKind};
