//! Grouped indicator aggregation.
//!
//! Aggregates never panic on degenerate groups: a division whose
//! denominator is zero or a spread over a single observation comes back
//! as `None` and is rendered as "undefined" downstream.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::{Indicator, TariffRecord, YearRange};

/// The value aggregated: one of the two charge components or one of
/// the precomputed indicator columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    FixedCharge,
    ConsumptionCharge,
    Indicator(Indicator),
}

impl Metric {
    /// The metric's value on one record, absent when the record does not
    /// carry the indicator column.
    pub fn value(self, record: &TariffRecord) -> Option<f64> {
        match self {
            Metric::FixedCharge => Some(record.fixed_charge),
            Metric::ConsumptionCharge => Some(record.consumption_charge),
            Metric::Indicator(indicator) => record.indicator(indicator),
        }
    }
}

/// How records are grouped before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Municipality,
    Stratum,
    MunicipalityStratum,
}

impl GroupKey {
    fn of(self, record: &TariffRecord) -> String {
        match self {
            GroupKey::Municipality => record.municipality.clone(),
            GroupKey::Stratum => record.stratum.clone(),
            GroupKey::MunicipalityStratum => {
                format!("{} / {}", record.municipality, record.stratum)
            }
        }
    }
}

/// Mean and spread of one metric within one group.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSummary {
    pub group: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; absent for singleton groups.
    pub std: Option<f64>,
}

/// Group records and compute mean and sample standard deviation of
/// `metric` per group, sorted by group name. Records without the metric
/// value do not contribute; groups with no contributing records are
/// omitted entirely.
pub fn summarize(records: &[&TariffRecord], key: GroupKey, metric: Metric) -> Vec<IndicatorSummary> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in records {
        if let Some(value) = metric.value(record) {
            groups.entry(key.of(record)).or_default().push(value);
        }
    }

    groups
        .into_iter()
        .map(|(group, values)| {
            let count = values.len();
            let mean = values.iter().sum::<f64>() / count as f64;
            IndicatorSummary {
                group,
                count,
                mean,
                std: sample_std(&values, mean),
            }
        })
        .collect()
}

fn sample_std(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let var =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    Some(var.sqrt())
}

/// Progressivity of the tariff structure: the ratio between the highest
/// and lowest stratum-level mean fixed charge.
///
/// Undefined (`None`) when there are no records or the cheapest stratum
/// averages zero; exactly 1.0 when a single stratum is present.
pub fn progressivity(records: &[&TariffRecord]) -> Option<f64> {
    let by_stratum = summarize(records, GroupKey::Stratum, Metric::FixedCharge);
    let max = by_stratum
        .iter()
        .map(|s| s.mean)
        .fold(f64::NEG_INFINITY, f64::max);
    let min = by_stratum
        .iter()
        .map(|s| s.mean)
        .fold(f64::INFINITY, f64::min);
    if by_stratum.is_empty() || min <= 0.0 {
        return None;
    }
    Some(max / min)
}

/// Geographic variability of `metric`: the spread of each municipality's
/// mean relative to the regional mean.
///
/// Each municipal mean is divided by the regional mean and the sample
/// standard deviation of those ratios is returned. Undefined when the
/// regional mean is zero or fewer than two municipalities contribute.
pub fn variability_index(records: &[&TariffRecord], metric: Metric) -> Option<f64> {
    let by_municipality = summarize(records, GroupKey::Municipality, metric);
    variability_of(&by_municipality)
}

fn variability_of(by_municipality: &[IndicatorSummary]) -> Option<f64> {
    if by_municipality.len() < 2 {
        return None;
    }
    let total: f64 = by_municipality.iter().map(|s| s.mean).sum();
    let regional_mean = total / by_municipality.len() as f64;
    if regional_mean.abs() < f64::EPSILON {
        return None;
    }
    let ratios: Vec<f64> = by_municipality
        .iter()
        .map(|s| s.mean / regional_mean)
        .collect();
    let ratio_mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    sample_std(&ratios, ratio_mean)
}

/// Per-municipality mean and spread of `metric`, sorted by name.
pub fn municipal_dispersion(records: &[&TariffRecord], metric: Metric) -> Vec<IndicatorSummary> {
    summarize(records, GroupKey::Municipality, metric)
}

/// One row of the municipality comparison table.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub municipality: String,
    pub mean_fixed_charge: f64,
    pub mean_consumption_charge: f64,
    /// Percent difference of the fixed-charge mean against the
    /// reference municipality, 0.0 for the reference itself; absent
    /// when the reference mean is zero or the reference has no rows in
    /// the range.
    pub pct_vs_reference: Option<f64>,
}

/// Compare every municipality's mean charges against a reference
/// municipality within an inclusive year range.
pub fn comparison_table(
    records: &[&TariffRecord],
    range: YearRange,
    reference: &str,
) -> Vec<ComparisonRow> {
    let in_range: Vec<&TariffRecord> = records
        .iter()
        .copied()
        .filter(|r| range.contains(r.year()))
        .collect();

    let fixed = summarize(&in_range, GroupKey::Municipality, Metric::FixedCharge);
    let consumption = summarize(&in_range, GroupKey::Municipality, Metric::ConsumptionCharge);

    let reference_mean = fixed
        .iter()
        .find(|s| s.group == reference)
        .map(|s| s.mean)
        .filter(|m| m.abs() > f64::EPSILON);

    fixed
        .into_iter()
        .map(|s| {
            let mean_consumption_charge = consumption
                .iter()
                .find(|c| c.group == s.group)
                .map(|c| c.mean)
                .unwrap_or(0.0);
            ComparisonRow {
                pct_vs_reference: reference_mean.map(|r| 100.0 * (s.mean - r) / r),
                municipality: s.group,
                mean_fixed_charge: s.mean,
                mean_consumption_charge,
            }
        })
        .collect()
}
