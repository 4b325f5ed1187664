// Error types shared by the stores and the engine.

use thiserror::Error;

/// Failures reported by a record or league store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored {what} is corrupt: {source}")]
    Corrupt {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("stored {what} has invalid value `{value}`")]
    InvalidValue { what: &'static str, value: String },

    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
}

/// Failures surfaced by a recompute operation.
///
/// Missing data, malformed position text and zero denominators are resolved
/// with defaults inside the engine and never appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },

    #[error("record store unavailable: {0}")]
    UpstreamUnavailable(#[source] StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::UpstreamUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_engine_not_found() {
        let err: EngineError = StoreError::NotFound {
            entity: "stint",
            id: "7".into(),
        }
        .into();
        assert!(matches!(err, EngineError::NotFound { entity: "stint", .. }));
        assert_eq!(err.to_string(), "stint `7` not found");
    }

    #[test]
    fn backend_failures_map_to_upstream_unavailable() {
        let err: EngineError =
            StoreError::Sqlite(rusqlite::Error::InvalidQuery).into();
        assert!(matches!(err, EngineError::UpstreamUnavailable(_)));
    }
}
