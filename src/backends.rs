//! Traits and type definitions for talking to inference backends.
//!
//! The `backends` module contains everything needed to call a single inference
//! server. Every backend is reached through the [`BackendClient`] trait, which
//! offers two essential operations:
//! - Models: list the models the backend currently serves. This feeds discovery.
//! - Forward: hand a request body to the backend and get back either a single
//!   JSON document or a lazy sequence of JSON fragments (a streamed reply).
//!
//! The router never looks inside request or response bodies beyond the routing
//! fields. Bodies travel as `serde_json` values and are passed through verbatim.
//!
//! ## Error Handling
//!
//! Each wire API has its own bespoke error type. These are encapsulated in
//! [`Error`], and the [`ErrorKind`] enum provides an indication of the category
//! of error that was raised. The HTTP boundary only ever matches on the kind.

mod apireq;
mod ollama;

#[cfg(test)]
pub(crate) mod testing;

pub(crate) use self::ollama::OllamaBackend;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error as StdError;
use std::fmt;

/// General categories of errors that can be returned by a [`BackendClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// Failed to connect to the backend. This could be due to DNS
    /// resolution, a refused connection, or routing problems.
    Connection,
    /// A request timed out.
    TimedOut,
    /// The requested resource was not found. This almost always means
    /// the backend does not (or no longer) serve the requested model.
    NotFound,
    /// The backend rejected the request as malformed. This corresponds
    /// to errors with HTTP status codes in the 400s.
    BadRequest,
    /// The backend encountered an error. This corresponds to errors with
    /// HTTP status codes in the 500s.
    InternalError,
    /// A response was unable to be deserialized, was malformed, or
    /// otherwise violated the assumptions of the client.
    UnexpectedResponse,
    /// An error that does not fit into any of the other categories.
    UnspecifiedError,
}

#[derive(Debug)]
pub(crate) struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub(crate) fn from_kind(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    pub(crate) fn from_source(kind: ErrorKind, source: Box<dyn StdError + Send + Sync>) -> Error {
        Error {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Connection => "failed to connect to the backend",
            ErrorKind::TimedOut => "request timed out",
            ErrorKind::NotFound => "the requested resource was not found",
            ErrorKind::BadRequest => "the request was bad or malformed",
            ErrorKind::InternalError => "the backend encountered an internal error",
            ErrorKind::UnexpectedResponse => "backend response was unexpected or malformed",
            ErrorKind::UnspecifiedError => "an unspecified error occurred",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message(), source),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

/// A model as reported by a backend's model listing.
///
/// Two descriptors are equal when their names are equal; the remaining fields
/// are informational and are passed through to callers verbatim.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ModelDescriptor {
    /// The canonical model identifier, e.g. `llama3:8b`.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(rename = "size", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ModelDescriptor {
    pub(crate) fn named<S: Into<String>>(name: S) -> ModelDescriptor {
        ModelDescriptor {
            name: name.into(),
            modified_at: None,
            digest: None,
            size_bytes: None,
            details: None,
        }
    }
}

impl PartialEq for ModelDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ModelDescriptor {}

/// The operations a backend can be asked to perform on behalf of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Operation {
    Chat,
    Generate,
    Embed,
    Show,
}

impl Operation {
    /// The path of the operation on the backend's HTTP API.
    pub(crate) fn path(self) -> &'static str {
        match self {
            Operation::Chat => "/api/chat",
            Operation::Generate => "/api/generate",
            Operation::Embed => "/api/embed",
            Operation::Show => "/api/show",
        }
    }

    /// Whether the backend is able to stream the result of this operation.
    pub(crate) fn can_stream(self) -> bool {
        matches!(self, Operation::Chat | Operation::Generate)
    }
}

/// A streamed reply from a backend, one JSON fragment at a time.
///
/// Dropping the iterator abandons the reply and releases the underlying
/// connection.
#[async_trait]
pub(crate) trait AsyncFragmentIterator: Send {
    /// The next fragment of the reply, or `None` once the backend has
    /// finished.
    async fn next(&mut self) -> Option<Result<Value, Error>>;
}

/// The result of forwarding a request to a backend.
pub(crate) enum Reply {
    /// The complete result as a single document.
    Whole(Value),
    /// An ordered sequence of partial results.
    Streamed(Box<dyn AsyncFragmentIterator>),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Whole(value) => f.debug_tuple("Whole").field(value).finish(),
            Reply::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

/// A trait implemented by all backend clients.
#[async_trait]
pub(crate) trait BackendClient: Send + Sync {
    /// Returns the models the backend currently serves.
    async fn models(&self) -> Result<Vec<ModelDescriptor>, Error>;

    /// Forwards a request body to the backend.
    ///
    /// `stream` selects between a [`Reply::Streamed`] and a [`Reply::Whole`]
    /// result. It is ignored for operations which cannot stream.
    async fn forward(
        &self,
        op: Operation,
        body: Map<String, Value>,
        stream: bool,
    ) -> Result<Reply, Error>;
}
