//! Holdout evaluation of the model families.
//!
//! The trailing fifth of the series is held out, each model is fitted
//! on the remainder and scored against the holdout. Scores are real
//! out-of-sample errors; a model that cannot be fitted or produces
//! non-finite errors is simply absent from the ranking.

use serde::Serialize;

use crate::common::{future_dates, infer_frequency, TimeSeries};

use super::{models, ModelKind};

/// Fraction of the series withheld for scoring.
const HOLDOUT_FRACTION: f64 = 0.2;

/// Smallest holdout that still says anything about accuracy.
const MIN_HOLDOUT: usize = 3;

/// Confidence level used during evaluation; point errors do not depend
/// on it but the models require one.
const EVAL_CONFIDENCE: f64 = 0.95;

/// Out-of-sample accuracy of one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelScore {
    pub model: ModelKind,
    /// Mean absolute percentage error over the holdout, in percent.
    pub mape: f64,
    /// Root mean squared error over the holdout.
    pub rmse: f64,
}

/// Score each model on a trailing holdout, best (lowest MAPE) first.
///
/// Series too short to split, models that fail to fit, and holdouts of
/// all-zero actuals (where MAPE is undefined) yield no score rather
/// than an error. An empty ranking is a valid outcome.
pub fn backtest(series: &TimeSeries, requested: &[ModelKind]) -> Vec<ModelScore> {
    let n = series.len();
    let holdout = ((n as f64 * HOLDOUT_FRACTION).ceil() as usize).max(MIN_HOLDOUT);
    if n <= holdout || n - holdout < models::CALENDAR_MIN_POINTS {
        return Vec::new();
    }

    let train = series.head(n - holdout);
    let actual = &series.values[n - holdout..];
    let frequency = infer_frequency(&train.dates);
    let last = match train.last_date() {
        Some(d) => d,
        None => return Vec::new(),
    };
    let future = future_dates(last, frequency, holdout);

    let mut scores: Vec<ModelScore> = requested
        .iter()
        .filter_map(|&model| {
            let forecast = models::run_model(model, &train, &future, EVAL_CONFIDENCE).ok()?;
            let score = score_forecast(model, &forecast.points, actual)?;
            tracing::debug!(%model, mape = score.mape, rmse = score.rmse, "holdout score");
            Some(score)
        })
        .collect();

    scores.sort_by(|a, b| a.mape.partial_cmp(&b.mape).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

fn score_forecast(model: ModelKind, predicted: &[f64], actual: &[f64]) -> Option<ModelScore> {
    if predicted.len() != actual.len() || actual.is_empty() {
        return None;
    }

    let mut abs_pct = Vec::with_capacity(actual.len());
    let mut sq_sum = 0.0;
    for (p, a) in predicted.iter().zip(actual.iter()) {
        sq_sum += (p - a).powi(2);
        if a.abs() > f64::EPSILON {
            abs_pct.push(((p - a) / a).abs());
        }
    }
    if abs_pct.is_empty() {
        // Every actual is zero: percentage error is undefined.
        return None;
    }

    let mape = 100.0 * abs_pct.iter().sum::<f64>() / abs_pct.len() as f64;
    let rmse = (sq_sum / actual.len() as f64).sqrt();
    if !mape.is_finite() || !rmse.is_finite() {
        return None;
    }

    Some(ModelScore { model, mape, rmse })
}
