use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::generation::error::PipelineError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Pipeline(other.into()),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Pipeline(e) => pipeline_parts(e),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        }
    }
}

/// Pipeline messages are returned verbatim (they are also what the failed run
/// stores), except persistence and internal faults.
fn pipeline_parts(e: &PipelineError) -> (StatusCode, &'static str, String) {
    let message = e.to_string();
    match e {
        PipelineError::Config(_) => {
            tracing::error!("Generation misconfigured: {message}");
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", message)
        }
        PipelineError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message),
        PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
        PipelineError::Upstream { .. } | PipelineError::Transport { .. } => {
            tracing::warn!("Upstream failure: {message}");
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
        }
        PipelineError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", message),
        PipelineError::EmptyOutput { .. }
        | PipelineError::Extraction(_)
        | PipelineError::Schema { .. } => {
            tracing::warn!("Unusable model output: {message}");
            (StatusCode::INTERNAL_SERVER_ERROR, "GENERATION_INVALID", message)
        }
        PipelineError::ActiveRun { .. } => (StatusCode::CONFLICT, "CONFLICT", message),
        PipelineError::Persistence(_) => {
            tracing::error!("Run persistence error: {message}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            )
        }
        PipelineError::Internal(_) => {
            tracing::error!("Pipeline internal error: {message}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::error::Stage;
    use crate::generation::schema::SchemaError;
    use crate::llm_client::ExtractError;
    use crate::models::run::RunKind;
    use serde_json::Value;
    use std::time::Duration;
    use uuid::Uuid;

    async fn render(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_schema_violation_keeps_field_path() {
        let err = PipelineError::schema("ideas", SchemaError::new("topics", "must have exactly 5 items (got 4)"));
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "GENERATION_INVALID");
        assert_eq!(
            body["error"]["message"],
            "ideas payload rejected: topics must have exactly 5 items (got 4)"
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases: Vec<(PipelineError, StatusCode)> = vec![
            (PipelineError::Config("missing key".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (PipelineError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (PipelineError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                PipelineError::Upstream {
                    stage: Stage::Agent,
                    status: 503,
                    body: "busy".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::Timeout {
                    stage: Stage::Completion,
                    after: Duration::from_secs(45),
                    hint: None,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                PipelineError::Extraction(ExtractError::NoObject { source_name: "caption".into() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PipelineError::ActiveRun {
                    kind: RunKind::Ideas,
                    target_id: Uuid::new_v4(),
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (err, expected) in cases {
            let (status, _) = render(err.into()).await;
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn test_database_details_are_masked() {
        let (status, body) = render(StoreError::Database(sqlx::Error::PoolTimedOut).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "A database error occurred");
    }
}
