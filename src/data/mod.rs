//! The tariff fact table: row type, indicator columns, and accessors.
//!
//! The fact table is the sole source of truth and is read-only once
//! loaded; every downstream structure is derived per request.

pub mod filter;
pub mod loader;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use strum::IntoEnumIterator;

pub use filter::{filter, fixed_charge_series, Selection, YearRange};
pub use loader::{load_fact_table, FactCache};

/// The precomputed indicator columns of the fact table.
///
/// The strum serialization doubles as the SQL column name and the
/// query-parameter identifier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum Indicator {
    // IET: tariff structure
    #[strum(serialize = "ratio_cargo_fijo_variable")]
    RatioCargoFijoVariable,
    #[strum(serialize = "indice_progresividad")]
    IndiceProgresividad,
    #[strum(serialize = "diferencial_estratos")]
    DiferencialEstratos,
    #[strum(serialize = "indice_sectorial")]
    IndiceSectorial,
    // IVG: geographic dispersion
    #[strum(serialize = "dispersion_municipal")]
    DispersionMunicipal,
    #[strum(serialize = "ratio_municipal")]
    RatioMunicipal,
    #[strum(serialize = "indice_variabilidad")]
    IndiceVariabilidad,
    // ISD: service differential
    #[strum(serialize = "ratio_servicios")]
    RatioServicios,
    #[strum(serialize = "diferencial_por_estrato")]
    DiferencialPorEstrato,
    #[strum(serialize = "indice_carga")]
    IndiceCarga,
    // ICO: operating cost
    #[strum(serialize = "ratio_penalizacion")]
    RatioPenalizacion,
    #[strum(serialize = "factor_operativo")]
    FactorOperativo,
    #[strum(serialize = "indice_penalizacion")]
    IndicePenalizacion,
}

impl Indicator {
    /// SQL column name in the fact table.
    pub fn column(self) -> &'static str {
        self.into()
    }

    pub fn all() -> Vec<Indicator> {
        Indicator::iter().collect()
    }
}

/// One fact row: a (municipality, stratum, service, date) observation
/// with its charge components and whichever precomputed indicators the
/// table carried for it. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct TariffRecord {
    pub date: NaiveDate,
    pub municipality: String,
    pub stratum: String,
    pub service: String,
    /// Flat component of the bill, independent of consumption.
    pub fixed_charge: f64,
    /// Consumption-based component of the bill.
    pub consumption_charge: f64,
    pub indicators: BTreeMap<Indicator, f64>,
}

impl TariffRecord {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn indicator(&self, indicator: Indicator) -> Option<f64> {
        self.indicators.get(&indicator).copied()
    }
}

/// The full fact table, ordered ascending by date.
#[derive(Debug, Clone, Default)]
pub struct FactTable {
    records: Vec<TariffRecord>,
}

impl FactTable {
    pub fn new(mut records: Vec<TariffRecord>) -> Self {
        records.sort_by_key(|r| r.date);
        Self { records }
    }

    pub fn records(&self) -> &[TariffRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct municipality names, sorted.
    pub fn municipalities(&self) -> Vec<String> {
        self.distinct(|r| &r.municipality)
    }

    /// Distinct stratum identifiers, sorted.
    pub fn strata(&self) -> Vec<String> {
        self.distinct(|r| &r.stratum)
    }

    /// Distinct service types, sorted.
    pub fn services(&self) -> Vec<String> {
        self.distinct(|r| &r.service)
    }

    /// Earliest and latest calendar year present.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let first = self.records.first()?.year();
        let last = self.records.last()?.year();
        Some((first, last))
    }

    fn distinct(&self, key: impl Fn(&TariffRecord) -> &String) -> Vec<String> {
        let set: BTreeSet<&String> = self.records.iter().map(|r| key(r)).collect();
        set.into_iter().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a record with the given keys; charges default to 100/200.
    pub fn record(
        date: NaiveDate,
        municipality: &str,
        stratum: &str,
        service: &str,
        fixed_charge: f64,
    ) -> TariffRecord {
        TariffRecord {
            date,
            municipality: municipality.to_string(),
            stratum: stratum.to_string(),
            service: service.to_string(),
            fixed_charge,
            consumption_charge: 2.0 * fixed_charge,
            indicators: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn fact_table_sorts_by_date() {
        let table = FactTable::new(vec![
            record(d(2023, 5, 1), "Bello", "1", "acueducto", 10.0),
            record(d(2022, 1, 1), "Bello", "1", "acueducto", 8.0),
            record(d(2022, 9, 1), "Bello", "1", "acueducto", 9.0),
        ]);
        let dates: Vec<NaiveDate> = table.records().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(2022, 1, 1), d(2022, 9, 1), d(2023, 5, 1)]);
        assert_eq!(table.year_span(), Some((2022, 2023)));
    }

    #[test]
    fn distinct_accessors_are_sorted_and_deduplicated() {
        let table = FactTable::new(vec![
            record(d(2023, 1, 1), "Medellín", "3", "alcantarillado", 10.0),
            record(d(2023, 1, 1), "Bello", "1", "acueducto", 10.0),
            record(d(2023, 2, 1), "Bello", "3", "acueducto", 10.0),
        ]);
        assert_eq!(table.municipalities(), vec!["Bello", "Medellín"]);
        assert_eq!(table.strata(), vec!["1", "3"]);
        assert_eq!(table.services(), vec!["acueducto", "alcantarillado"]);
    }

    #[test]
    fn indicator_column_names_round_trip() {
        use std::str::FromStr;
        for indicator in Indicator::all() {
            let parsed = Indicator::from_str(indicator.column()).unwrap();
            assert_eq!(parsed, indicator);
        }
        assert_eq!(Indicator::IndiceCarga.column(), "indice_carga");
    }
}
