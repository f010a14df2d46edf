//! The registry knows which backends exist and which models each of them
//! serves, and picks a backend for a model.
//!
//! Everything the registry knows is held in a [`Snapshot`]: the backend set,
//! one descriptor per backend, and the model index built from
//! them. A discovery pass asks every configured backend for its models and
//! publishes a whole new snapshot in one step. Readers take a reference to the
//! current snapshot and never observe a pass half-way through.
//!
//! Selection is a lookup in the current index. When the model is not indexed,
//! the registry runs one discovery pass (sharing it with any concurrent misses)
//! and looks again before giving up. Among the backends serving a model, one
//! is chosen uniformly at random.

mod descriptor;
mod discovery;
mod index;
#[allow(clippy::module_inception)]
mod registry;

pub(crate) use self::registry::{Error, Registry, Snapshot};

use std::sync::Arc;
use std::time::Duration;

use crate::backends::{self, BackendClient, OllamaBackend};
use crate::config::BackendSpec;

/// Builds the client used to reach a newly configured backend.
pub(crate) type Connector =
    Arc<dyn Fn(&BackendSpec) -> Result<Arc<dyn BackendClient>, backends::Error> + Send + Sync>;

/// Connects to backends speaking the Ollama HTTP API.
pub(crate) fn ollama_connector(request_timeout: Duration) -> Connector {
    Arc::new(move |spec: &BackendSpec| {
        let backend = OllamaBackend::new(&spec.address, request_timeout)?;

        Ok(Arc::new(backend) as Arc<dyn BackendClient>)
    })
}
