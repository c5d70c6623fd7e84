//! Forecast orchestration.
//!
//! Each enabled model family runs independently against the same series
//! and the same future date axis; one model failing never suppresses
//! the others. The per-model outcome (forecast or error message) is
//! carried in the report so the caller can render partial results.

pub mod evaluation;
pub mod models;

use serde::Serialize;

use crate::common::{future_dates, infer_frequency, ForecastResult, Frequency, TimeSeries};
use crate::error::{DashboardError, Result};

pub use evaluation::{backtest, ModelScore};

/// Longest accepted forecast horizon: ten years of monthly periods.
/// Requests beyond it are rejected rather than silently shortened.
pub const MAX_HORIZON: usize = 120;

/// The forecasting model families offered by the predictions page.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Automatic exponential smoothing, seasonal when a season is detected.
    Ets,
    /// Autoregression on first differences, integrated back to levels.
    Arima,
    /// Regression on calendar features (month and year).
    Calendar,
}

impl ModelKind {
    pub fn all() -> Vec<ModelKind> {
        use strum::IntoEnumIterator;
        ModelKind::iter().collect()
    }
}

/// The outcome of one model run: a forecast or the reason it failed.
#[derive(Debug, Clone, Serialize)]
pub struct ModelOutcome {
    pub model: ModelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelOutcome {
    fn from_result(model: ModelKind, result: Result<ForecastResult>) -> Self {
        match result {
            Ok(forecast) => Self {
                model,
                forecast: Some(forecast),
                error: None,
            },
            Err(e) => Self {
                model,
                forecast: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn ok(&self) -> Option<&ForecastResult> {
        self.forecast.as_ref()
    }
}

/// Per-model outcomes for one run, plus the shared forecast axis.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub horizon: usize,
    pub confidence_level: f64,
    pub frequency: Frequency,
    pub outcomes: Vec<ModelOutcome>,
}

impl ForecastReport {
    pub fn outcome(&self, model: ModelKind) -> Option<&ModelOutcome> {
        self.outcomes.iter().find(|o| o.model == model)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (ModelKind, &ForecastResult)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.forecast.as_ref().map(|f| (o.model, f)))
    }

    pub fn all_failed(&self) -> bool {
        self.outcomes.iter().all(|o| o.forecast.is_none())
    }
}

/// Run every requested model against `series`.
///
/// The future date axis is shared: the sampling frequency is inferred
/// from the observed dates (defaulting to monthly) and `horizon` dates
/// are generated strictly after the last observation. Model failures
/// are captured per model; only invalid parameters fail the whole run.
pub fn run_forecasts(
    series: &TimeSeries,
    horizon: usize,
    confidence_level: f64,
    requested: &[ModelKind],
) -> Result<ForecastReport> {
    if horizon == 0 {
        return Err(DashboardError::InvalidRequest(
            "forecast horizon must be at least 1 period".to_string(),
        ));
    }
    if horizon > MAX_HORIZON {
        return Err(DashboardError::InvalidRequest(format!(
            "forecast horizon must not exceed {MAX_HORIZON} periods, got {horizon}"
        )));
    }
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(DashboardError::InvalidRequest(format!(
            "confidence level must be strictly between 0 and 1, got {confidence_level}"
        )));
    }
    if requested.is_empty() {
        return Err(DashboardError::InvalidRequest(
            "at least one model must be requested".to_string(),
        ));
    }

    let frequency = infer_frequency(&series.dates);
    let last = series
        .last_date()
        .ok_or_else(|| DashboardError::InvalidRequest("series has no observations".to_string()))?;
    let future = future_dates(last, frequency, horizon);

    let mut outcomes = Vec::with_capacity(requested.len());
    for &model in requested {
        let result = models::run_model(model, series, &future, confidence_level);
        if let Err(e) = &result {
            tracing::warn!(%model, error = %e, "model run failed");
        }
        outcomes.push(ModelOutcome::from_result(model, result));
    }

    Ok(ForecastReport {
        horizon,
        confidence_level,
        frequency,
        outcomes,
    })
}
