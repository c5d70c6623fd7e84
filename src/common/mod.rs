//! Shared time-series primitives used by every pipeline stage.

pub mod types;

pub use types::{
    future_dates, infer_frequency, ForecastResult, Frequency, TimePoint, TimeSeries,
};
