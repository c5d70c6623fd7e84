//! The filter stage: narrow the fact table to one selection tuple.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::TimeSeries;

use super::{FactTable, TariffRecord};

/// An explicit, immutable selection tuple. One of these is built per
/// request from the widget state and passed through the pipeline; no
/// stage reads ambient session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub municipality: String,
    pub stratum: String,
    pub service: String,
}

impl Selection {
    pub fn new(
        municipality: impl Into<String>,
        stratum: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            municipality: municipality.into(),
            stratum: stratum.into(),
            service: service.into(),
        }
    }

    pub fn matches(&self, record: &TariffRecord) -> bool {
        record.municipality == self.municipality
            && record.stratum == self.stratum
            && record.service == self.service
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / estrato {} / {}",
            self.municipality, self.stratum, self.service
        )
    }
}

/// An inclusive calendar-year range for the comparison views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub from: i32,
    pub to: i32,
}

impl YearRange {
    pub fn new(from: i32, to: i32) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.from && year <= self.to
    }
}

/// Rows matching all three selection predicates exactly (case-sensitive),
/// ascending by date. An empty result is a valid outcome, not an error;
/// callers short-circuit dependent computations on it.
pub fn filter<'a>(table: &'a FactTable, selection: &Selection) -> Vec<&'a TariffRecord> {
    // The fact table is date-ordered, so the subset is too.
    table
        .records()
        .iter()
        .filter(|r| selection.matches(r))
        .collect()
}

/// The (date, fixed charge) series for one selection tuple.
pub fn fixed_charge_series(table: &FactTable, selection: &Selection) -> TimeSeries {
    let rows = filter(table, selection);
    TimeSeries::new(
        rows.iter().map(|r| r.date).collect(),
        rows.iter().map(|r| r.fixed_charge).collect(),
    )
}
