//! The three model families behind the predictions page.

use augurs_core::{Fit, Predict};
use augurs_ets::AutoETS;
use chrono::{Datelike, NaiveDate};
use linregress::{FormulaRegressionBuilder, RegressionDataBuilder};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::common::{ForecastResult, TimeSeries};
use crate::error::{DashboardError, Result};
use crate::seasonality::detect_season_length;

use super::ModelKind;

/// Minimum observations per model family. ETS can smooth very short
/// series; the differenced autoregression needs one extra point per
/// transform, and the calendar regression needs enough rows to estimate
/// two slopes plus an intercept.
pub const ETS_MIN_POINTS: usize = 4;
pub const ARIMA_MIN_POINTS: usize = 5;
pub const CALENDAR_MIN_POINTS: usize = 6;

/// Fit `model` on `series` and forecast one value per date in `future`.
pub fn run_model(
    model: ModelKind,
    series: &TimeSeries,
    future: &[NaiveDate],
    confidence_level: f64,
) -> Result<ForecastResult> {
    match model {
        ModelKind::Ets => forecast_ets(series, future, confidence_level),
        ModelKind::Arima => forecast_ar_diff(series, future, confidence_level),
        ModelKind::Calendar => forecast_calendar(series, future, confidence_level),
    }
}

fn fit_error(model: ModelKind, reason: impl Into<String>) -> DashboardError {
    DashboardError::ModelFit {
        model: model.to_string(),
        reason: reason.into(),
    }
}

/// Automatic exponential smoothing.
///
/// When a seasonal period is detected and the series covers at least
/// three full cycles, the search space includes seasonal components;
/// otherwise a non-seasonal model is fitted.
pub fn forecast_ets(
    series: &TimeSeries,
    future: &[NaiveDate],
    confidence_level: f64,
) -> Result<ForecastResult> {
    let n = series.len();
    if n < ETS_MIN_POINTS {
        return Err(fit_error(
            ModelKind::Ets,
            format!("need at least {ETS_MIN_POINTS} observations, got {n}"),
        ));
    }

    let season = detect_season_length(&series.values).filter(|&p| n >= 3 * p);
    let model = match season {
        Some(period) => AutoETS::new(period, "ZZZ")
            .map_err(|e| fit_error(ModelKind::Ets, format!("seasonal model setup failed: {e}")))?,
        None => AutoETS::non_seasonal(),
    };

    let fitted = model
        .fit(&series.values)
        .map_err(|e| fit_error(ModelKind::Ets, format!("fit failed: {e}")))?;
    let forecast = fitted
        .predict(future.len(), confidence_level)
        .map_err(|e| fit_error(ModelKind::Ets, format!("prediction failed: {e}")))?;

    let (lower, upper) = match forecast.intervals {
        Some(intervals) => (intervals.lower, intervals.upper),
        None => (forecast.point.clone(), forecast.point.clone()),
    };

    Ok(ForecastResult {
        dates: future.to_vec(),
        points: forecast.point,
        lower,
        upper,
    })
}

/// Autoregression on first differences, integrated back to levels.
///
/// An AR(1) is fitted to the differenced series by least squares and
/// iterated forward; forecasts are cumulated onto the last observed
/// level. Interval widths grow with the horizon through the integrated
/// psi weights. A zero-variance differenced series degenerates to a
/// drift forecast with collapsed intervals.
pub fn forecast_ar_diff(
    series: &TimeSeries,
    future: &[NaiveDate],
    confidence_level: f64,
) -> Result<ForecastResult> {
    let n = series.len();
    if n < ARIMA_MIN_POINTS {
        return Err(fit_error(
            ModelKind::Arima,
            format!("need at least {ARIMA_MIN_POINTS} observations, got {n}"),
        ));
    }
    let horizon = future.len();

    let diffs: Vec<f64> = series.values.windows(2).map(|w| w[1] - w[0]).collect();
    let last_level = series.values[n - 1];

    let diff_mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let diff_var =
        diffs.iter().map(|d| (d - diff_mean).powi(2)).sum::<f64>() / diffs.len() as f64;

    if diff_var < 1e-10 {
        // Constant steps: pure drift, no residual spread to widen with.
        let points: Vec<f64> = (1..=horizon)
            .map(|i| last_level + diff_mean * i as f64)
            .collect();
        return Ok(ForecastResult {
            dates: future.to_vec(),
            points: points.clone(),
            lower: points.clone(),
            upper: points,
        });
    }

    // d_t regressed on d_{t-1}.
    let pairs = diffs.len() - 1;
    let data = vec![
        ("Y".to_string(), diffs[1..].to_vec()),
        ("X".to_string(), diffs[..pairs].to_vec()),
    ];
    let regression_data = RegressionDataBuilder::new()
        .build_from(data)
        .map_err(|e| fit_error(ModelKind::Arima, format!("regression data: {e}")))?;
    let model = FormulaRegressionBuilder::new()
        .data(&regression_data)
        .formula("Y ~ X")
        .fit()
        .map_err(|e| fit_error(ModelKind::Arima, format!("fit failed: {e}")))?;

    let params = model.parameters();
    let intercept = params[0];
    let phi = params[1];
    let residual_var = model.scale();

    let df = (pairs as f64 - 2.0).max(1.0);
    let t_dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| fit_error(ModelKind::Arima, format!("t-distribution: {e}")))?;
    let alpha = 1.0 - confidence_level;
    let t_value = t_dist.inverse_cdf(1.0 - alpha / 2.0);

    let mut points = Vec::with_capacity(horizon);
    let mut lower = Vec::with_capacity(horizon);
    let mut upper = Vec::with_capacity(horizon);

    let mut level = last_level;
    let mut diff_prev = *diffs.last().unwrap_or(&diff_mean);
    let mut psi_sq_sum = 0.0;

    for step in 0..horizon {
        let diff_hat = intercept + phi * diff_prev;
        level += diff_hat;

        // psi_j of ARIMA(1,1,0): cumulative sum of phi powers.
        let psi = if (1.0 - phi).abs() < 1e-10 {
            (step + 1) as f64
        } else {
            (1.0 - phi.powi(step as i32 + 1)) / (1.0 - phi)
        };
        psi_sq_sum += psi * psi;
        let width = t_value * (residual_var * psi_sq_sum).sqrt();

        if !level.is_finite() || !width.is_finite() {
            return Err(fit_error(
                ModelKind::Arima,
                "forecast produced non-finite values",
            ));
        }

        points.push(level);
        lower.push(level - width);
        upper.push(level + width);
        diff_prev = diff_hat;
    }

    Ok(ForecastResult {
        dates: future.to_vec(),
        points,
        lower,
        upper,
    })
}

/// Regression on calendar features.
///
/// Levels are regressed on month-of-year and calendar year; when the
/// sample spans a single year the year term is dropped to keep the
/// design matrix full rank. Intervals are a constant band of the
/// residual standard error scaled by the normal quantile of the
/// requested confidence level.
pub fn forecast_calendar(
    series: &TimeSeries,
    future: &[NaiveDate],
    confidence_level: f64,
) -> Result<ForecastResult> {
    let n = series.len();
    if n < CALENDAR_MIN_POINTS {
        return Err(fit_error(
            ModelKind::Calendar,
            format!("need at least {CALENDAR_MIN_POINTS} observations, got {n}"),
        ));
    }

    let months: Vec<f64> = series.dates.iter().map(|d| f64::from(d.month())).collect();
    let years: Vec<f64> = series.dates.iter().map(|d| f64::from(d.year())).collect();
    let multi_year = years.windows(2).any(|w| w[0] != w[1]);

    let mut data = vec![
        ("Y".to_string(), series.values.clone()),
        ("MONTH".to_string(), months),
    ];
    if multi_year {
        data.push(("YEAR".to_string(), years));
    }
    let formula = if multi_year { "Y ~ MONTH + YEAR" } else { "Y ~ MONTH" };

    let regression_data = RegressionDataBuilder::new()
        .build_from(data)
        .map_err(|e| fit_error(ModelKind::Calendar, format!("regression data: {e}")))?;
    let model = FormulaRegressionBuilder::new()
        .data(&regression_data)
        .formula(formula)
        .fit()
        .map_err(|e| fit_error(ModelKind::Calendar, format!("fit failed: {e}")))?;

    let params = model.parameters();
    let intercept = params[0];
    let month_slope = params[1];
    let year_slope = if multi_year { params[2] } else { 0.0 };
    let residual_se = model.scale().sqrt();

    let width = if residual_se < 1e-10 {
        0.0
    } else {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| fit_error(ModelKind::Calendar, format!("normal quantile: {e}")))?;
        let alpha = 1.0 - confidence_level;
        normal.inverse_cdf(1.0 - alpha / 2.0) * residual_se
    };

    let mut points = Vec::with_capacity(future.len());
    let mut lower = Vec::with_capacity(future.len());
    let mut upper = Vec::with_capacity(future.len());
    for date in future {
        let y_hat = intercept
            + month_slope * f64::from(date.month())
            + year_slope * f64::from(date.year());
        if !y_hat.is_finite() || !width.is_finite() {
            return Err(fit_error(
                ModelKind::Calendar,
                "forecast produced non-finite values",
            ));
        }
        points.push(y_hat);
        lower.push(y_hat - width);
        upper.push(y_hat + width);
    }

    Ok(ForecastResult {
        dates: future.to_vec(),
        points,
        lower,
        upper,
    })
}
