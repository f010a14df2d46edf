use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::backends::{self, ErrorKind};
use crate::registry;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Selection(#[from] registry::Error),

    #[error("backend \"{backend}\" failed to serve model \"{model}\": {source}")]
    Backend {
        model: String,
        backend: String,
        #[source]
        source: backends::Error,
    },
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Selection(err @ registry::Error::ModelNotFound(_)) => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            ApiError::Selection(err @ registry::Error::EmptyModelName) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            ApiError::Backend { model, source, .. } => match source.kind() {
                ErrorKind::NotFound => (
                    StatusCode::NOT_FOUND,
                    format!("model \"{}\" not found on the selected backend", model),
                ),
                ErrorKind::BadRequest => (StatusCode::BAD_REQUEST, source.to_string()),
                _ => (
                    StatusCode::BAD_GATEWAY,
                    "backend failed to serve the request".to_string(),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
