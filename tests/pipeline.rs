//! End-to-end pipeline tests: a seeded database through loading,
//! filtering, forecasting and the page payloads.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{Months, NaiveDate};
use duckdb::Connection;

use aburra_tarifas::common::Frequency;
use aburra_tarifas::config::BoundarySettings;
use aburra_tarifas::data::{filter, fixed_charge_series, loader, Selection, YearRange};
use aburra_tarifas::forecast::{run_forecasts, ModelKind};
use aburra_tarifas::geo::{choropleth, BoundarySet, NO_DATA_FILL};
use aburra_tarifas::indicators::Metric;
use aburra_tarifas::pages;

/// Three years of monthly observations for two municipalities and two
/// strata of the water service, with a gentle trend.
fn seeded_connection() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory database");
    conn.execute_batch(
        r#"
        CREATE TABLE tarifas (
            fecha DATE,
            municipio VARCHAR,
            estrato VARCHAR,
            servicio VARCHAR,
            "Cargo Fijo" DOUBLE,
            "Cargo por Consumo" DOUBLE,
            indice_carga DOUBLE
        );
        "#,
    )
    .expect("create fact table");

    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let mut stmt = conn
        .prepare("INSERT INTO tarifas VALUES (?, ?, ?, ?, ?, ?, ?)")
        .expect("prepare insert");
    for i in 0..36u32 {
        let date = start.checked_add_months(Months::new(i)).unwrap();
        let date = date.format("%Y-%m-%d").to_string();
        let trend = 3.0 * f64::from(i);
        for (municipio, estrato, base) in [
            ("Medellín", "1", 950.0),
            ("Medellín", "2", 1400.0),
            ("Itagüí", "1", 1100.0),
        ] {
            stmt.execute(duckdb::params![
                date,
                municipio,
                estrato,
                "acueducto",
                base + trend,
                2.0 * (base + trend),
                0.5,
            ])
            .expect("insert row");
        }
    }
    conn
}

#[test]
fn load_filter_forecast_round_trip() {
    let conn = seeded_connection();
    let table = loader::load_from_connection(&conn, "tarifas").unwrap();
    assert_eq!(table.len(), 36 * 3);
    assert_eq!(table.municipalities(), vec!["Itagüí", "Medellín"]);
    assert_eq!(table.year_span(), Some((2021, 2023)));

    let selection = Selection::new("Medellín", "1", "acueducto");
    let rows = filter(&table, &selection);
    assert_eq!(rows.len(), 36);

    let series = fixed_charge_series(&table, &selection);
    let report = run_forecasts(&series, 12, 0.95, &ModelKind::all()).unwrap();
    assert_eq!(report.frequency, Frequency::Monthly);
    assert!(!report.all_failed());

    let last = series.last_date().unwrap();
    for (_, forecast) in report.succeeded() {
        assert_eq!(forecast.dates.len(), 12);
        assert_eq!(forecast.points.len(), 12);
        assert_eq!(forecast.lower.len(), 12);
        assert_eq!(forecast.upper.len(), 12);
        assert!(forecast.dates[0] > last);
        for w in forecast.dates.windows(2) {
            assert!(w[1] > w[0]);
        }
        for i in 0..12 {
            assert!(forecast.lower[i] <= forecast.points[i]);
            assert!(forecast.points[i] <= forecast.upper[i]);
        }
    }
}

#[test]
fn absent_selection_short_circuits_every_stage() {
    let conn = seeded_connection();
    let table = loader::load_from_connection(&conn, "tarifas").unwrap();

    let selection = Selection::new("Envigado", "5", "alcantarillado");
    assert!(filter(&table, &selection).is_empty());

    let page = pages::predictions(&table, &selection, 12, 0.95, &ModelKind::all()).unwrap();
    assert!(!page.has_data);
    assert!(page.report.is_none());
    assert!(page.evaluation.is_empty());
}

#[test]
fn overview_page_from_database() {
    let conn = seeded_connection();
    let table = loader::load_from_connection(&conn, "tarifas").unwrap();

    let selection = Selection::new("Medellín", "1", "acueducto");
    let page = pages::overview(&table, &selection, Some(YearRange::new(2021, 2023)));
    assert!(page.has_data);
    assert_eq!(page.current_tariff.unwrap().value, 950.0 + 3.0 * 35.0);
    assert!(page.annual_variation_pct.unwrap() > 0.0);
    // Stratum 2 is dearer than stratum 1 everywhere in the seed.
    assert!(page.progressivity.unwrap() > 1.0);
    assert_eq!(page.comparison.len(), 2);
}

#[test]
fn choropleth_joins_accented_names_from_a_geojson_file() {
    let geojson = serde_json::json!({
        "type": "FeatureCollection",
        "features": [
            { "properties": { "MpNombre": "MEDELLIN" }, "geometry": null },
            { "properties": { "MpNombre": "Itagui" }, "geometry": null },
            { "properties": { "MpNombre": "Sabaneta" }, "geometry": null }
        ]
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{geojson}").unwrap();

    let settings = BoundarySettings {
        geojson_path: file.path().to_path_buf(),
        name_property: "MpNombre".to_string(),
    };
    let boundaries = BoundarySet::from_geojson_path(&settings).unwrap();
    assert_eq!(boundaries.len(), 3);

    // Accented data names join the plain map names.
    let mut values = BTreeMap::new();
    values.insert("Medellín".to_string(), 1000.0);
    values.insert("Itagüí".to_string(), 1200.0);
    let layer = choropleth(&boundaries, &values);
    assert!(layer.unmatched.is_empty());

    let shaded: Vec<_> = layer
        .features
        .iter()
        .filter(|f| f.fill != NO_DATA_FILL)
        .collect();
    assert_eq!(shaded.len(), 2);
    let sabaneta = layer
        .features
        .iter()
        .find(|f| f.name == "Sabaneta")
        .unwrap();
    assert_eq!(sabaneta.fill, NO_DATA_FILL);
}

#[test]
fn geographic_page_from_database() {
    let conn = seeded_connection();
    let table = loader::load_from_connection(&conn, "tarifas").unwrap();

    let geojson = serde_json::json!({
        "type": "FeatureCollection",
        "features": [
            { "properties": { "MpNombre": "Medellín" }, "geometry": null },
            { "properties": { "MpNombre": "Itagüí" }, "geometry": null }
        ]
    });
    let boundaries = BoundarySet::from_value(&geojson, "MpNombre").unwrap();
    let page = pages::geographic(
        &table,
        "1",
        "acueducto",
        Metric::FixedCharge,
        None,
        Some(&boundaries),
    );

    assert_eq!(page.ranking.len(), 2);
    assert_eq!(page.ranking[0].group, "Itagüí");
    assert!(page.variability_index.is_some());
    assert!(page.layer.unwrap().unmatched.is_empty());
}

#[test]
fn geographic_page_degrades_when_boundary_file_is_missing() {
    let conn = seeded_connection();
    let table = loader::load_from_connection(&conn, "tarifas").unwrap();

    let settings = BoundarySettings {
        geojson_path: std::path::PathBuf::from("/nonexistent/municipios.geojson"),
        name_property: "MpNombre".to_string(),
    };
    let boundaries = BoundarySet::from_geojson_path(&settings).ok();
    assert!(boundaries.is_none());

    let page = pages::geographic(
        &table,
        "1",
        "acueducto",
        Metric::FixedCharge,
        None,
        boundaries.as_ref(),
    );
    assert!(page.layer.is_none());
    assert!(page.map_note.is_some());
    assert_eq!(page.ranking.len(), 2);
    assert!(page.summary.is_some());
}
