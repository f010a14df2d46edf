use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::error::ApiError;
use super::streaming::ndjson_response;
use crate::backends::{ModelDescriptor, Operation, Reply};
use crate::registry::Registry;

/// Shared application state
pub(crate) struct AppState {
    pub registry: Arc<Registry>,
    /// The longest a streamed reply may go without producing a fragment.
    pub stream_idle_timeout: Duration,
}

impl AppState {
    pub(crate) fn new(registry: Arc<Registry>, stream_idle_timeout: Duration) -> AppState {
        AppState {
            registry,
            stream_idle_timeout,
        }
    }
}

/// The routing fields of an inbound request. Everything else is forwarded
/// as is.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelRequest {
    model: String,
    #[serde(default)]
    stream: Option<bool>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// `show` also accepts the older `name` field.
#[derive(Debug, Deserialize)]
pub(crate) struct ShowRequest {
    #[serde(default)]
    model: Option<String>,
    // Older clients send `name`; `model` wins when both are present
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl From<ShowRequest> for ModelRequest {
    fn from(req: ShowRequest) -> ModelRequest {
        ModelRequest {
            model: req.model.or(req.name).unwrap_or_default(),
            stream: None,
            rest: req.rest,
        }
    }
}

impl ModelRequest {
    fn into_body(self, stream: Option<bool>) -> Map<String, Value> {
        let mut body = self.rest;

        body.insert("model".to_string(), Value::String(self.model));

        if let Some(stream) = stream {
            body.insert("stream".to_string(), Value::Bool(stream));
        }

        body
    }
}

async fn forward(state: &AppState, op: Operation, req: ModelRequest) -> Result<Response, ApiError> {
    let backend = state.registry.select(&req.model).await?;

    // The backend protocol streams unless told otherwise
    let stream = op.can_stream().then(|| req.stream.unwrap_or(true));
    let model = req.model.clone();

    tracing::debug!(%op, model = %model, backend = %backend.id, ?stream, "forwarding");

    let reply = backend
        .client
        .forward(op, req.into_body(stream), stream.unwrap_or(false))
        .await
        .map_err(|source| ApiError::Backend {
            model,
            backend: backend.id.clone(),
            source,
        })?;

    Ok(match reply {
        Reply::Whole(value) => Json(value).into_response(),
        Reply::Streamed(fragments) => {
            ndjson_response(fragments, state.stream_idle_timeout, backend.id.clone())
        }
    })
}

pub(crate) async fn root() -> &'static str {
    "Ollama is running"
}

pub(crate) async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModelRequest>,
) -> Result<Response, ApiError> {
    forward(&state, Operation::Chat, req).await
}

pub(crate) async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModelRequest>,
) -> Result<Response, ApiError> {
    forward(&state, Operation::Generate, req).await
}

pub(crate) async fn embed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModelRequest>,
) -> Result<Response, ApiError> {
    forward(&state, Operation::Embed, req).await
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShowRequest>,
) -> Result<Response, ApiError> {
    forward(&state, Operation::Show, req.into()).await
}

#[derive(Debug, Serialize)]
pub(crate) struct TaggedModel {
    model: String,
    #[serde(flatten)]
    descriptor: ModelDescriptor,
    backends: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagsResponse {
    models: Vec<TaggedModel>,
}

/// Every model served by any backend, after a fresh discovery pass.
pub(crate) async fn tags(State(state): State<Arc<AppState>>) -> Json<TagsResponse> {
    state.registry.refresh().await;

    let snapshot = state.registry.snapshot().await;

    let models = snapshot
        .index()
        .entries()
        .into_iter()
        .map(|entry| TaggedModel {
            model: entry.model.name.clone(),
            descriptor: entry.model.clone(),
            backends: entry.backends.iter().map(|b| b.address.clone()).collect(),
        })
        .collect();

    Json(TagsResponse { models })
}

#[derive(Debug, Serialize)]
pub(crate) struct BackendEntry {
    id: String,
    address: String,
    status: String,
    models: usize,
}

/// The state of every backend as of the last discovery pass.
pub(crate) async fn backends(State(state): State<Arc<AppState>>) -> Json<Vec<BackendEntry>> {
    let snapshot = state.registry.snapshot().await;

    Json(
        snapshot
            .backends()
            .iter()
            .map(|backend| BackendEntry {
                id: backend.id.clone(),
                address: backend.address.clone(),
                status: backend.status.to_string(),
                models: backend.served_models.len(),
            })
            .collect(),
    )
}
