use std::fmt;
use std::sync::Arc;

use crate::backends::{BackendClient, ModelDescriptor};

/// How the most recent discovery pass went for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendStatus {
    /// The backend answered; its model list is current.
    Ready,
    /// The backend did not answer. The models it reported previously are
    /// still served from it.
    Stale { reason: String },
    /// The backend did not answer and nothing is known about it.
    Unreachable { reason: String },
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStatus::Ready => write!(f, "ok"),
            BackendStatus::Stale { reason } => write!(f, "stale: {}", reason),
            BackendStatus::Unreachable { reason } => write!(f, "unreachable: {}", reason),
        }
    }
}

/// One inference backend as of a discovery pass. Descriptors are never
/// modified once published; each pass builds new ones.
pub(crate) struct BackendDescriptor {
    pub id: String,
    /// Normalised base URL; the identity of the backend.
    pub address: String,
    pub client: Arc<dyn BackendClient>,
    pub served_models: Vec<ModelDescriptor>,
    pub status: BackendStatus,
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("served_models", &self.served_models)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
