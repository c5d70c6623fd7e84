//! Environment-driven configuration.
//!
//! All knobs come from environment variables (optionally via a `.env`
//! file loaded by the launcher), mirroring how the deployment supplies
//! database and server parameters.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DashboardError, Result};

/// Name of the fact table holding tariff rows plus precomputed indicators.
pub const DEFAULT_FACT_TABLE: &str = "tarifas_acueductos_aguas_residuales_med_ing_caracteristicas";

/// Port the original dashboard served on; kept as the default.
pub const DEFAULT_PORT: u16 = 8501;

const DEFAULT_CACHE_TTL_SECS: u64 = 900;

/// Where the fact table lives and how long a loaded snapshot stays fresh.
#[derive(Debug, Clone)]
pub struct DbSettings {
    /// Path to the DuckDB database file, or `:memory:`.
    pub database: String,
    /// Name of the fact table.
    pub fact_table: String,
    /// Time-to-live of the cached fact table snapshot.
    pub cache_ttl: Duration,
}

/// Bind address of the HTTP surface.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Geographic boundary dataset for the choropleth page.
#[derive(Debug, Clone)]
pub struct BoundarySettings {
    /// Path to a GeoJSON FeatureCollection of municipality polygons.
    pub geojson_path: PathBuf,
    /// Feature property carrying the municipality name.
    pub name_property: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub db: DbSettings,
    pub server: ServerSettings,
    pub boundaries: BoundarySettings,
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    ///
    /// Variables: `TARIFAS_DB`, `TARIFAS_TABLE`, `TARIFAS_CACHE_TTL_SECS`,
    /// `HOST`, `PORT`, `TARIFAS_GEOJSON`, `TARIFAS_NAME_PROPERTY`.
    pub fn from_env() -> Result<Self> {
        let database = env::var("TARIFAS_DB").unwrap_or_else(|_| "tarifas.duckdb".to_string());
        let fact_table =
            env::var("TARIFAS_TABLE").unwrap_or_else(|_| DEFAULT_FACT_TABLE.to_string());
        let cache_ttl = match env::var("TARIFAS_CACHE_TTL_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                DashboardError::InvalidRequest(format!(
                    "TARIFAS_CACHE_TTL_SECS must be a number of seconds, got '{raw}'"
                ))
            })?),
            Err(_) => Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        };

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| {
                DashboardError::InvalidRequest(format!("PORT must be a port number, got '{raw}'"))
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let geojson_path = PathBuf::from(
            env::var("TARIFAS_GEOJSON").unwrap_or_else(|_| "data/municipios.geojson".to_string()),
        );
        let name_property =
            env::var("TARIFAS_NAME_PROPERTY").unwrap_or_else(|_| "MpNombre".to_string());

        Ok(Settings {
            db: DbSettings {
                database,
                fact_table,
                cache_ttl,
            },
            server: ServerSettings { host, port },
            boundaries: BoundarySettings {
                geojson_path,
                name_property,
            },
        })
    }
}
