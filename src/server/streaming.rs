use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;

use crate::backends::AsyncFragmentIterator;

const NDJSON: &str = "application/x-ndjson";

fn line(value: &Value) -> Bytes {
    Bytes::from(format!("{}\n", value))
}

/// Relays a streamed reply as newline-delimited JSON, one line per fragment,
/// each written as soon as the backend produces it.
///
/// If the backend fails, or goes quiet for longer than `idle_timeout`, a final
/// `{"error": ...}` line is written and the response ends. Lines already
/// written are never altered. When the caller goes away the body is dropped,
/// and with it the backend connection.
pub(crate) fn ndjson_response(
    fragments: Box<dyn AsyncFragmentIterator>,
    idle_timeout: Duration,
    backend: String,
) -> Response {
    let lines = stream::unfold(Some(fragments), move |fragments| {
        let backend = backend.clone();

        async move {
            let mut fragments = fragments?;

            let failure = match tokio::time::timeout(idle_timeout, fragments.next()).await {
                Ok(Some(Ok(fragment))) => {
                    return Some((Ok::<_, Infallible>(line(&fragment)), Some(fragments)));
                }
                Ok(None) => return None,
                Ok(Some(Err(err))) => {
                    tracing::warn!(%backend, error = %err, "backend failed mid-stream");
                    "backend failed mid-stream"
                }
                Err(_) => {
                    tracing::warn!(%backend, ?idle_timeout, "backend went quiet mid-stream");
                    "backend stopped responding mid-stream"
                }
            };

            Some((Ok(line(&json!({ "error": failure }))), None))
        }
    });

    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response()
}
