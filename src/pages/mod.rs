//! Declarative page payloads.
//!
//! Each page is a plain serializable description of what to render.
//! Pages derive everything from the fact table per request and never
//! mutate shared state; an empty selection produces an explicit
//! "no data" payload and short-circuits every dependent computation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::common::{ForecastResult, TimePoint, TimeSeries};
use crate::data::{filter, fixed_charge_series, FactTable, Selection, TariffRecord, YearRange};
use crate::error::Result;
use crate::forecast::{backtest, run_forecasts, ForecastReport, ModelKind, ModelScore};
use crate::geo::{choropleth, BoundarySet, ChoroplethLayer};
use crate::indicators::{
    comparison_table, municipal_dispersion, progressivity, summarize, variability_index,
    ComparisonRow, GroupKey, IndicatorSummary, Metric,
};

/// Dropdown options for the selection widgets.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOptions {
    pub municipalities: Vec<String>,
    pub strata: Vec<String>,
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_span: Option<(i32, i32)>,
}

pub fn selection_options(table: &FactTable) -> SelectionOptions {
    SelectionOptions {
        municipalities: table.municipalities(),
        strata: table.strata(),
        services: table.services(),
        year_span: table.year_span(),
    }
}

/// The landing page: headline figures for one selection plus the
/// region-wide indicator blocks.
#[derive(Debug, Clone, Serialize)]
pub struct OverviewPage {
    pub selection: Selection,
    pub has_data: bool,
    /// Latest observed fixed charge for the selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tariff: Option<TimePoint>,
    /// Smoothed fixed charge three periods ahead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_term_forecast: Option<f64>,
    /// Observed series, for the headline chart.
    pub history: Vec<TimePoint>,
    /// One-year smoothed forecast with its band, for the headline chart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastResult>,
    /// Change against the observation one year earlier, in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_variation_pct: Option<f64>,
    /// Mean fixed charge per stratum within the selected municipality
    /// and service.
    pub stratum_composition: Vec<IndicatorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progressivity: Option<f64>,
    /// Mean and spread per municipality for the selected stratum and
    /// service, across the whole region.
    pub municipal_dispersion: Vec<IndicatorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variability_index: Option<f64>,
    pub comparison: Vec<ComparisonRow>,
    /// Mean fixed charge for every municipality and stratum offering the
    /// selected service.
    pub regional_breakdown: Vec<IndicatorSummary>,
}

pub fn overview(
    table: &FactTable,
    selection: &Selection,
    comparison_range: Option<YearRange>,
) -> OverviewPage {
    let rows = filter(table, selection);
    let series = fixed_charge_series(table, selection);

    let current_tariff = series.last_date().zip(series.last_value()).map(|(date, value)| {
        TimePoint { date, value }
    });

    let forecast = if series.is_empty() {
        None
    } else {
        run_forecasts(&series, 12, 0.95, &[ModelKind::Ets])
            .ok()
            .and_then(|report| {
                report
                    .succeeded()
                    .next()
                    .map(|(_, f)| f.clone())
            })
    };
    // Headline figure: the smoothed level three periods out.
    let short_term_forecast = forecast.as_ref().and_then(|f| f.points.get(2).copied());

    let history: Vec<TimePoint> = series
        .dates
        .iter()
        .zip(series.values.iter())
        .map(|(&date, &value)| TimePoint { date, value })
        .collect();

    let annual_variation_pct = annual_variation(&series);

    // Stratum composition is scoped to the selected municipality and
    // service across all strata.
    let municipality_rows: Vec<&TariffRecord> = table
        .records()
        .iter()
        .filter(|r| r.municipality == selection.municipality && r.service == selection.service)
        .collect();
    let stratum_composition =
        summarize(&municipality_rows, GroupKey::Stratum, Metric::FixedCharge);
    let progressivity = progressivity(&municipality_rows);

    // Dispersion compares municipalities at the selected stratum and
    // service.
    let regional_rows: Vec<&TariffRecord> = table
        .records()
        .iter()
        .filter(|r| r.stratum == selection.stratum && r.service == selection.service)
        .collect();
    let dispersion = municipal_dispersion(&regional_rows, Metric::FixedCharge);
    let variability = variability_index(&regional_rows, Metric::FixedCharge);

    let comparison = match comparison_range {
        Some(range) => comparison_table(&regional_rows, range, &selection.municipality),
        None => Vec::new(),
    };

    // Breakdown table: every municipality and stratum of the service.
    let service_rows: Vec<&TariffRecord> = table
        .records()
        .iter()
        .filter(|r| r.service == selection.service)
        .collect();
    let regional_breakdown = summarize(
        &service_rows,
        GroupKey::MunicipalityStratum,
        Metric::FixedCharge,
    );

    OverviewPage {
        selection: selection.clone(),
        has_data: !rows.is_empty(),
        current_tariff,
        short_term_forecast,
        history,
        forecast,
        annual_variation_pct,
        stratum_composition,
        progressivity,
        municipal_dispersion: dispersion,
        variability_index: variability,
        comparison,
        regional_breakdown,
    }
}

/// Percent change of the latest observation against the one closest to
/// a year before it. Undefined when the baseline is missing or zero.
fn annual_variation(series: &TimeSeries) -> Option<f64> {
    let last_date = series.last_date()?;
    let last_value = series.last_value()?;
    let cutoff = last_date - chrono::Duration::days(365);

    let baseline = series
        .dates
        .iter()
        .zip(series.values.iter())
        .filter(|(d, _)| **d <= cutoff)
        .last()
        .map(|(_, v)| *v)?;
    if baseline.abs() < f64::EPSILON {
        return None;
    }
    Some(100.0 * (last_value - baseline) / baseline)
}

/// Spread of the municipal means shown next to the map.
#[derive(Debug, Clone, Serialize)]
pub struct RegionalSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation of the municipal means; absent with a
    /// single municipality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
}

/// The map page: a shaded municipality layer plus a ranking table.
///
/// The ranking, summary and variability index come from the fact table
/// alone; when the boundary dataset cannot be loaded the layer is
/// omitted and `map_note` says so, but the rest of the page still
/// renders.
#[derive(Debug, Clone, Serialize)]
pub struct GeographicPage {
    pub stratum: String,
    pub service: String,
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<ChoroplethLayer>,
    /// Why the map layer is missing, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_note: Option<String>,
    /// Municipal means, highest first.
    pub ranking: Vec<IndicatorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RegionalSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variability_index: Option<f64>,
}

pub fn geographic(
    table: &FactTable,
    stratum: &str,
    service: &str,
    metric: Metric,
    range: Option<YearRange>,
    boundaries: Option<&BoundarySet>,
) -> GeographicPage {
    let rows: Vec<&TariffRecord> = table
        .records()
        .iter()
        .filter(|r| {
            r.stratum == stratum
                && r.service == service
                && range.map_or(true, |years| years.contains(r.year()))
        })
        .collect();

    let mut ranking = municipal_dispersion(&rows, metric);
    let values: BTreeMap<String, f64> = ranking
        .iter()
        .map(|s| (s.group.clone(), s.mean))
        .collect();
    ranking.sort_by(|a, b| b.mean.partial_cmp(&a.mean).unwrap_or(std::cmp::Ordering::Equal));

    let summary = regional_summary(&ranking);

    let (layer, map_note) = match boundaries {
        Some(set) => (Some(choropleth(set, &values)), None),
        None => (
            None,
            Some("boundary dataset unavailable; map layer omitted".to_string()),
        ),
    };

    GeographicPage {
        stratum: stratum.to_string(),
        service: service.to_string(),
        metric,
        layer,
        map_note,
        ranking,
        summary,
        variability_index: variability_index(&rows, metric),
    }
}

fn regional_summary(ranking: &[IndicatorSummary]) -> Option<RegionalSummary> {
    if ranking.is_empty() {
        return None;
    }
    let means: Vec<f64> = ranking.iter().map(|s| s.mean).collect();
    let mean = means.iter().sum::<f64>() / means.len() as f64;
    let std = if means.len() < 2 {
        None
    } else {
        let var = means.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / (means.len() as f64 - 1.0);
        Some(var.sqrt())
    };
    Some(RegionalSummary {
        min: means.iter().cloned().fold(f64::INFINITY, f64::min),
        max: means.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        mean,
        std,
    })
}

/// The predictions page: history, per-model forecasts and the holdout
/// ranking for one selection.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionsPage {
    pub selection: Selection,
    pub has_data: bool,
    pub history: Vec<TimePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ForecastReport>,
    pub evaluation: Vec<ModelScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended: Option<ModelKind>,
}

pub fn predictions(
    table: &FactTable,
    selection: &Selection,
    horizon: usize,
    confidence_level: f64,
    models: &[ModelKind],
) -> Result<PredictionsPage> {
    let series = fixed_charge_series(table, selection);

    // No observations: nothing downstream runs, no model is invoked.
    if series.is_empty() {
        return Ok(PredictionsPage {
            selection: selection.clone(),
            has_data: false,
            history: Vec::new(),
            report: None,
            evaluation: Vec::new(),
            recommended: None,
        });
    }

    let history = series
        .dates
        .iter()
        .zip(series.values.iter())
        .map(|(&date, &value)| TimePoint { date, value })
        .collect();

    let report = run_forecasts(&series, horizon, confidence_level, models)?;
    let evaluation = backtest(&series, models);
    let recommended = evaluation
        .first()
        .map(|s| s.model)
        .or_else(|| report.succeeded().next().map(|(m, _)| m));

    Ok(PredictionsPage {
        selection: selection.clone(),
        has_data: true,
        history,
        report: Some(report),
        evaluation,
        recommended,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::record;
    use chrono::{Months, NaiveDate};
    use serde_json::json;

    fn monthly_table(months: u32) -> FactTable {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let mut records = Vec::new();
        for i in 0..months {
            let date = start.checked_add_months(Months::new(i)).unwrap();
            records.push(record(date, "Bello", "1", "acueducto", 100.0 + 2.0 * i as f64));
            records.push(record(date, "Bello", "2", "acueducto", 150.0 + 2.0 * i as f64));
            records.push(record(date, "Envigado", "1", "acueducto", 130.0 + 2.0 * i as f64));
        }
        FactTable::new(records)
    }

    #[test]
    fn overview_headline_metrics() {
        let table = monthly_table(24);
        let page = overview(
            &table,
            &Selection::new("Bello", "1", "acueducto"),
            Some(YearRange::new(2021, 2022)),
        );
        assert!(page.has_data);
        let current = page.current_tariff.unwrap();
        assert_eq!(current.value, 100.0 + 2.0 * 23.0);
        assert!(page.short_term_forecast.is_some());
        // 146 now vs 122 a year earlier.
        let variation = page.annual_variation_pct.unwrap();
        assert!((variation - 100.0 * 24.0 / 122.0).abs() < 1e-9);
        assert_eq!(page.stratum_composition.len(), 2);
        assert!(page.progressivity.unwrap() > 1.0);
        assert_eq!(page.municipal_dispersion.len(), 2);
        assert!(!page.comparison.is_empty());
        // One row per (municipality, stratum) pair offering the service.
        assert_eq!(page.regional_breakdown.len(), 3);
        assert!(page
            .regional_breakdown
            .iter()
            .any(|s| s.group == "Bello / 2"));
    }

    #[test]
    fn overview_empty_selection_has_no_metrics() {
        let table = monthly_table(12);
        let page = overview(&table, &Selection::new("Caldas", "1", "acueducto"), None);
        assert!(!page.has_data);
        assert!(page.current_tariff.is_none());
        assert!(page.short_term_forecast.is_none());
        assert!(page.annual_variation_pct.is_none());
    }

    #[test]
    fn geographic_ranks_municipalities_and_shades_map() {
        let table = monthly_table(12);
        let geojson = json!({
            "type": "FeatureCollection",
            "features": [
                { "properties": { "MpNombre": "BELLO" }, "geometry": null },
                { "properties": { "MpNombre": "Envigado" }, "geometry": null },
                { "properties": { "MpNombre": "Sabaneta" }, "geometry": null }
            ]
        });
        let boundaries = BoundarySet::from_value(&geojson, "MpNombre").unwrap();
        let page = geographic(
            &table,
            "1",
            "acueducto",
            Metric::FixedCharge,
            None,
            Some(&boundaries),
        );

        assert_eq!(page.ranking.len(), 2);
        assert_eq!(page.ranking[0].group, "Envigado");
        let layer = page.layer.unwrap();
        let sabaneta = layer
            .features
            .iter()
            .find(|f| f.name == "Sabaneta")
            .unwrap();
        assert_eq!(sabaneta.fill, crate::geo::NO_DATA_FILL);
        let summary = page.summary.unwrap();
        assert!(summary.min < summary.max);
        assert!(summary.std.is_some());
    }

    #[test]
    fn geographic_year_range_excludes_other_years() {
        let table = monthly_table(24);
        let geojson = json!({
            "type": "FeatureCollection",
            "features": [ { "properties": { "MpNombre": "Bello" }, "geometry": null } ]
        });
        let boundaries = BoundarySet::from_value(&geojson, "MpNombre").unwrap();
        let all = geographic(
            &table,
            "1",
            "acueducto",
            Metric::FixedCharge,
            None,
            Some(&boundaries),
        );
        let first_year = geographic(
            &table,
            "1",
            "acueducto",
            Metric::FixedCharge,
            Some(YearRange::new(2021, 2021)),
            Some(&boundaries),
        );
        // The 2021 subset averages lower than the full trending series.
        let bello = |page: &GeographicPage| {
            page.ranking
                .iter()
                .find(|s| s.group == "Bello")
                .map(|s| s.mean)
                .unwrap()
        };
        assert!(bello(&first_year) < bello(&all));
    }

    #[test]
    fn geographic_without_boundaries_keeps_ranking_and_summary() {
        let table = monthly_table(12);
        let page = geographic(&table, "1", "acueducto", Metric::FixedCharge, None, None);
        assert!(page.layer.is_none());
        assert!(page.map_note.is_some());
        assert_eq!(page.ranking.len(), 2);
        assert!(page.summary.is_some());
        assert!(page.variability_index.is_some());
    }

    #[test]
    fn predictions_empty_selection_short_circuits() {
        let table = monthly_table(12);
        let page = predictions(
            &table,
            &Selection::new("Caldas", "9", "acueducto"),
            12,
            0.95,
            &ModelKind::all(),
        )
        .unwrap();
        assert!(!page.has_data);
        assert!(page.report.is_none());
        assert!(page.evaluation.is_empty());
        assert!(page.recommended.is_none());
    }

    #[test]
    fn predictions_runs_models_and_ranks_them() {
        let table = monthly_table(36);
        let page = predictions(
            &table,
            &Selection::new("Bello", "1", "acueducto"),
            12,
            0.95,
            &ModelKind::all(),
        )
        .unwrap();
        assert!(page.has_data);
        assert_eq!(page.history.len(), 36);
        let report = page.report.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        for (_, forecast) in report.succeeded() {
            assert_eq!(forecast.points.len(), 12);
        }
        assert!(page.recommended.is_some());
    }
}
