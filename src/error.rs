use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Error taxonomy of the tariff dashboard.
///
/// Terminal errors (`ConnectionFailure`, `SchemaMismatch`, `EmptyTable`)
/// halt the page load with a user-visible message. Everything else degrades:
/// an empty selection renders placeholder metrics, a failed model is omitted
/// from the report while the other models proceed, and an unmatched boundary
/// geometry is rendered with a neutral fill. No operation is retried.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// The database could not be reached or the query failed outright.
    #[error("database connection failed: {0}")]
    ConnectionFailure(#[from] duckdb::Error),

    /// The fact table exists but lacks columns the pipeline depends on.
    #[error("fact table '{table}' is missing required columns: {missing:?}")]
    SchemaMismatch { table: String, missing: Vec<String> },

    /// The fact table query returned no usable rows.
    #[error("fact table '{0}' returned no usable rows")]
    EmptyTable(String),

    /// One forecasting model could not be fitted. Reported per model;
    /// never aborts the remaining models.
    #[error("model '{model}' failed to fit: {reason}")]
    ModelFit { model: String, reason: String },

    /// The geographic boundary dataset could not be loaded or is unusable.
    /// The geographic page is served without its map layer.
    #[error("boundary dataset unavailable: {0}")]
    BoundaryUnavailable(String),

    /// A request carried parameters the pipeline cannot act on.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DashboardError {
    /// Whether the error halts the page load (true) or merely degrades it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DashboardError::ConnectionFailure(_)
                | DashboardError::SchemaMismatch { .. }
                | DashboardError::EmptyTable(_)
        )
    }
}
