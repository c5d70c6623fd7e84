//! HTTP surface of the tariff dashboard.
//!
//! Serves each page payload as JSON on the port the dashboard has
//! always used. All state is an environment-driven `Settings` plus the
//! TTL cache around the fact table.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use aburra_tarifas::config::Settings;
use aburra_tarifas::data::{FactCache, Indicator, Selection, YearRange};
use aburra_tarifas::error::DashboardError;
use aburra_tarifas::forecast::ModelKind;
use aburra_tarifas::geo::BoundarySet;
use aburra_tarifas::indicators::Metric;
use aburra_tarifas::pages;

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    cache: Arc<FactCache>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let state = AppState {
        settings: Arc::new(settings),
        cache: Arc::new(FactCache::new()),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/opciones", get(opciones))
        .route("/api/overview", get(overview))
        .route("/api/geografico", get(geografico))
        .route("/api/predicciones", get(predicciones))
        .route("/api/recargar", post(recargar))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "tariff dashboard listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Newtype so pipeline errors map onto HTTP statuses.
struct ApiError(DashboardError);

impl From<DashboardError> for ApiError {
    fn from(e: DashboardError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DashboardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            e if e.is_terminal() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self.0, %status, "request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn opciones(State(state): State<AppState>) -> Result<Response, ApiError> {
    let table = state.cache.get_or_load(&state.settings.db)?;
    Ok(Json(pages::selection_options(&table)).into_response())
}

#[derive(Debug, Deserialize)]
struct OverviewParams {
    municipio: String,
    estrato: String,
    servicio: String,
    desde: Option<i32>,
    hasta: Option<i32>,
}

async fn overview(
    State(state): State<AppState>,
    Query(params): Query<OverviewParams>,
) -> Result<Response, ApiError> {
    let table = state.cache.get_or_load(&state.settings.db)?;
    let range = year_range(params.desde, params.hasta)?;
    let selection = Selection::new(&params.municipio, &params.estrato, &params.servicio);
    let page = pages::overview(&table, &selection, range);
    Ok(Json(page).into_response())
}

#[derive(Debug, Deserialize)]
struct GeographicParams {
    estrato: String,
    servicio: String,
    indicador: Option<String>,
    desde: Option<i32>,
    hasta: Option<i32>,
}

async fn geografico(
    State(state): State<AppState>,
    Query(params): Query<GeographicParams>,
) -> Result<Response, ApiError> {
    let table = state.cache.get_or_load(&state.settings.db)?;
    let metric = parse_metric(params.indicador.as_deref())?;
    let range = year_range(params.desde, params.hasta)?;
    // An unusable boundary file degrades the page to its tabular parts
    // instead of failing the request.
    let boundaries = match BoundarySet::from_geojson_path(&state.settings.boundaries) {
        Ok(set) => Some(set),
        Err(e) => {
            tracing::warn!(error = %e, "boundary dataset unavailable, serving page without map");
            None
        }
    };
    let page = pages::geographic(
        &table,
        &params.estrato,
        &params.servicio,
        metric,
        range,
        boundaries.as_ref(),
    );
    Ok(Json(page).into_response())
}

fn year_range(desde: Option<i32>, hasta: Option<i32>) -> Result<Option<YearRange>, ApiError> {
    match (desde, hasta) {
        (Some(from), Some(to)) if from <= to => Ok(Some(YearRange::new(from, to))),
        (Some(_), Some(_)) => Err(DashboardError::InvalidRequest(
            "'desde' must not exceed 'hasta'".to_string(),
        )
        .into()),
        _ => Ok(None),
    }
}

fn parse_metric(raw: Option<&str>) -> Result<Metric, ApiError> {
    let raw = match raw {
        None => return Ok(Metric::FixedCharge),
        Some(raw) => raw,
    };
    match raw {
        "cargo_fijo" => Ok(Metric::FixedCharge),
        "cargo_consumo" => Ok(Metric::ConsumptionCharge),
        other => Indicator::from_str(other).map(Metric::Indicator).map_err(|_| {
            DashboardError::InvalidRequest(format!("unknown indicator '{other}'")).into()
        }),
    }
}

#[derive(Debug, Deserialize)]
struct PredictionParams {
    municipio: String,
    estrato: String,
    servicio: String,
    horizonte: Option<usize>,
    confianza: Option<f64>,
    /// Comma-separated model names; all models when absent.
    modelos: Option<String>,
}

async fn predicciones(
    State(state): State<AppState>,
    Query(params): Query<PredictionParams>,
) -> Result<Response, ApiError> {
    let table = state.cache.get_or_load(&state.settings.db)?;

    let models = match &params.modelos {
        None => ModelKind::all(),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                ModelKind::from_str(s).map_err(|_| {
                    DashboardError::InvalidRequest(format!("unknown model '{s}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let selection = Selection::new(&params.municipio, &params.estrato, &params.servicio);
    let page = pages::predictions(
        &table,
        &selection,
        params.horizonte.unwrap_or(12),
        params.confianza.unwrap_or(0.95),
        &models,
    )?;
    Ok(Json(page).into_response())
}

async fn recargar(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.cache.invalidate();
    let table = state.cache.get_or_load(&state.settings.db)?;
    tracing::info!(rows = table.len(), "fact table reloaded on request");
    Ok(Json(json!({ "reloaded": true, "rows": table.len() })).into_response())
}
