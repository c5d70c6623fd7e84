//! Geographic boundaries and the choropleth join.
//!
//! Municipality names in the fact table and in the boundary dataset
//! disagree on case, accents and spacing, so the join runs on a
//! normalized form of both sides. A municipality present in the
//! boundary file but absent from the data is painted neutral grey
//! instead of being dropped from the map.

use std::collections::BTreeMap;
use std::fs;

use serde::Serialize;
use serde_json::Value;
use unidecode::unidecode;

use crate::config::BoundarySettings;
use crate::error::{DashboardError, Result};

/// Fill for boundary polygons with no matching data.
pub const NO_DATA_FILL: &str = "#808080";

/// Yellow-to-red ramp, lowest bucket first.
const RAMP: [&str; 5] = ["#ffffb2", "#fecc5c", "#fd8d3c", "#f03b20", "#bd0026"];

/// Canonical join key for a municipality name: ASCII-folded,
/// lowercased, all whitespace removed.
pub fn normalize_name(name: &str) -> String {
    unidecode(name)
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// One municipality polygon from the boundary dataset.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub name: String,
    pub normalized: String,
    /// GeoJSON geometry, passed through opaquely to the map renderer.
    pub geometry: Value,
}

/// The boundary dataset, indexed by normalized municipality name.
#[derive(Debug, Clone)]
pub struct BoundarySet {
    boundaries: Vec<Boundary>,
}

impl BoundarySet {
    /// Load a GeoJSON FeatureCollection from disk.
    ///
    /// The coordinate reference system must be WGS84; an explicit CRS
    /// declaration naming anything else is rejected up front rather
    /// than producing a silently misplaced map.
    pub fn from_geojson_path(settings: &BoundarySettings) -> Result<Self> {
        let raw = fs::read_to_string(&settings.geojson_path).map_err(|e| {
            DashboardError::BoundaryUnavailable(format!(
                "cannot read {}: {e}",
                settings.geojson_path.display()
            ))
        })?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| DashboardError::BoundaryUnavailable(format!("invalid GeoJSON: {e}")))?;
        Self::from_value(&value, &settings.name_property)
    }

    /// Build the set from an already-parsed GeoJSON value.
    pub fn from_value(value: &Value, name_property: &str) -> Result<Self> {
        if let Some(crs_name) = value
            .pointer("/crs/properties/name")
            .and_then(Value::as_str)
        {
            let wgs84 = crs_name.contains("CRS84") || crs_name.contains("4326");
            if !wgs84 {
                return Err(DashboardError::BoundaryUnavailable(format!(
                    "boundary dataset declares unsupported CRS '{crs_name}'"
                )));
            }
        }

        let features = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DashboardError::BoundaryUnavailable(
                    "GeoJSON has no 'features' array".to_string(),
                )
            })?;

        let mut boundaries = Vec::with_capacity(features.len());
        for feature in features {
            let name = match feature
                .pointer(&format!("/properties/{name_property}"))
                .and_then(Value::as_str)
            {
                Some(name) => name.to_string(),
                None => continue,
            };
            let geometry = feature.get("geometry").cloned().unwrap_or(Value::Null);
            boundaries.push(Boundary {
                normalized: normalize_name(&name),
                name,
                geometry,
            });
        }

        if boundaries.is_empty() {
            return Err(DashboardError::BoundaryUnavailable(
                "boundary dataset contains no named features".to_string(),
            ));
        }
        Ok(Self { boundaries })
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }
}

/// One shaded polygon of the choropleth layer.
#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethFeature {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub fill: String,
    pub geometry: Value,
}

/// Shade every boundary by the municipal values, joining on normalized
/// names. Boundaries without a value keep the neutral fill; values
/// without a boundary are reported back so the page can surface them.
#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethLayer {
    pub features: Vec<ChoroplethFeature>,
    /// Municipalities present in the data but absent from the map.
    pub unmatched: Vec<String>,
}

pub fn choropleth(set: &BoundarySet, values: &BTreeMap<String, f64>) -> ChoroplethLayer {
    let normalized: BTreeMap<String, f64> = values
        .iter()
        .map(|(name, &v)| (normalize_name(name), v))
        .collect();

    let finite: Vec<f64> = normalized.values().copied().filter(|v| v.is_finite()).collect();
    let min = finite.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let features = set
        .boundaries
        .iter()
        .map(|b| {
            let value = normalized.get(&b.normalized).copied().filter(|v| v.is_finite());
            let fill = match value {
                Some(v) => ramp_color(v, min, max).to_string(),
                None => NO_DATA_FILL.to_string(),
            };
            ChoroplethFeature {
                name: b.name.clone(),
                value,
                fill,
                geometry: b.geometry.clone(),
            }
        })
        .collect();

    let unmatched = values
        .keys()
        .filter(|name| {
            let key = normalize_name(name);
            !set.boundaries.iter().any(|b| b.normalized == key)
        })
        .cloned()
        .collect();

    ChoroplethLayer {
        features,
        unmatched,
    }
}

fn ramp_color(value: f64, min: f64, max: f64) -> &'static str {
    if !(max > min) {
        // Single distinct value: middle of the ramp.
        return RAMP[2];
    }
    let t = ((value - min) / (max - min)).clamp(0.0, 1.0);
    let bucket = ((t * RAMP.len() as f64) as usize).min(RAMP.len() - 1);
    RAMP[bucket]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_set() -> BoundarySet {
        let geojson = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "MpNombre": "Itagüí" },
                    "geometry": { "type": "Polygon", "coordinates": [] }
                },
                {
                    "type": "Feature",
                    "properties": { "MpNombre": "La Estrella" },
                    "geometry": { "type": "Polygon", "coordinates": [] }
                },
                {
                    "type": "Feature",
                    "properties": { "MpNombre": "Bello" },
                    "geometry": { "type": "Polygon", "coordinates": [] }
                }
            ]
        });
        BoundarySet::from_value(&geojson, "MpNombre").unwrap()
    }

    #[test]
    fn normalization_strips_accents_case_and_spaces() {
        assert_eq!(normalize_name("São Paulo"), "saopaulo");
        assert_eq!(normalize_name("ITAGÜÍ"), "itagui");
        assert_eq!(normalize_name("La  Estrella"), "laestrella");
    }

    #[test]
    fn join_is_accent_and_case_insensitive() {
        let set = sample_set();
        let mut values = BTreeMap::new();
        values.insert("ITAGUI".to_string(), 10.0);
        values.insert("la estrella".to_string(), 20.0);

        let layer = choropleth(&set, &values);
        assert!(layer.unmatched.is_empty());
        let itagui = layer.features.iter().find(|f| f.name == "Itagüí").unwrap();
        assert_eq!(itagui.value, Some(10.0));
        let estrella = layer
            .features
            .iter()
            .find(|f| f.name == "La Estrella")
            .unwrap();
        assert_eq!(estrella.value, Some(20.0));
    }

    #[test]
    fn missing_boundary_file_is_reported_unavailable() {
        let settings = BoundarySettings {
            geojson_path: std::path::PathBuf::from("/nonexistent/municipios.geojson"),
            name_property: "MpNombre".to_string(),
        };
        let err = BoundarySet::from_geojson_path(&settings).unwrap_err();
        assert!(matches!(err, DashboardError::BoundaryUnavailable(_)));
    }

    #[test]
    fn unmatched_boundary_gets_neutral_fill() {
        let set = sample_set();
        let mut values = BTreeMap::new();
        values.insert("Itagüí".to_string(), 10.0);
        values.insert("Bello".to_string(), 40.0);

        let layer = choropleth(&set, &values);
        let estrella = layer
            .features
            .iter()
            .find(|f| f.name == "La Estrella")
            .unwrap();
        assert_eq!(estrella.fill, NO_DATA_FILL);
        assert_eq!(estrella.value, None);

        let itagui = layer.features.iter().find(|f| f.name == "Itagüí").unwrap();
        assert_ne!(itagui.fill, NO_DATA_FILL);
        assert_eq!(itagui.value, Some(10.0));
    }

    #[test]
    fn data_without_boundary_is_reported_not_dropped() {
        let set = sample_set();
        let mut values = BTreeMap::new();
        values.insert("Caldas".to_string(), 5.0);
        let layer = choropleth(&set, &values);
        assert_eq!(layer.unmatched, vec!["Caldas".to_string()]);
    }

    #[test]
    fn extremes_take_the_ramp_ends() {
        let set = sample_set();
        let mut values = BTreeMap::new();
        values.insert("Itagüí".to_string(), 0.0);
        values.insert("Bello".to_string(), 100.0);
        values.insert("La Estrella".to_string(), 50.0);
        let layer = choropleth(&set, &values);
        let fill_of = |name: &str| {
            layer
                .features
                .iter()
                .find(|f| f.name == name)
                .unwrap()
                .fill
                .clone()
        };
        assert_eq!(fill_of("Itagüí"), RAMP[0]);
        assert_eq!(fill_of("Bello"), RAMP[RAMP.len() - 1]);
    }

    #[test]
    fn non_wgs84_crs_is_rejected() {
        let geojson = json!({
            "type": "FeatureCollection",
            "crs": { "properties": { "name": "urn:ogc:def:crs:EPSG::3857" } },
            "features": []
        });
        let err = BoundarySet::from_value(&geojson, "MpNombre").unwrap_err();
        assert!(matches!(err, DashboardError::BoundaryUnavailable(_)));
    }
}
