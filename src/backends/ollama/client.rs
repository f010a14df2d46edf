use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use serde_json::{Map, Value};
use std::time::Duration;

use super::api;
use crate::backends::{
    AsyncFragmentIterator, BackendClient, Error, ErrorKind, ModelDescriptor, Operation, Reply,
};

impl From<api::Tag> for ModelDescriptor {
    fn from(value: api::Tag) -> Self {
        ModelDescriptor {
            name: value.name,
            modified_at: value.modified_at,
            digest: value.digest,
            size_bytes: value.size,
            details: value.details,
        }
    }
}

impl From<api::Error> for Error {
    fn from(value: api::Error) -> Self {
        let kind = match &value {
            api::Error::InternalError(_) => Some(ErrorKind::InternalError),
            api::Error::InvalidApiBase(_)
            | api::Error::InvalidEndpoint(_)
            | api::Error::ClientBuild(_) => Some(ErrorKind::Connection),
            api::Error::TimedOut(_) => Some(ErrorKind::TimedOut),
            api::Error::NotFound(_) => Some(ErrorKind::NotFound),
            api::Error::BadRequest(_) => Some(ErrorKind::BadRequest),
            api::Error::RequestFailed(_) | api::Error::StreamParser(_) => None,
            api::Error::UnspecifiedError(_) => Some(ErrorKind::UnspecifiedError),
        };

        match (kind, value) {
            (None, api::Error::RequestFailed(err)) => err.into(),
            (None, api::Error::StreamParser(err)) => err.into(),
            (kind, value) => Error::from_source(
                kind.unwrap_or(ErrorKind::UnspecifiedError),
                Box::new(value),
            ),
        }
    }
}

/// A single Ollama server.
pub(crate) struct OllamaBackend {
    api: api::OllamaApi,
}

impl OllamaBackend {
    /// `address` must be an absolute http(s) URL. `request_timeout` bounds
    /// buffered calls and the wait for the first byte of streamed ones.
    pub(crate) fn new(address: &str, request_timeout: Duration) -> Result<OllamaBackend, Error> {
        Ok(OllamaBackend {
            api: api::OllamaApi::with_api_base(address, request_timeout)?,
        })
    }
}

pub(crate) struct OllamaFragments<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    inner: api::StreamingResponse<S>,
}

#[async_trait]
impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin + Send> AsyncFragmentIterator
    for OllamaFragments<S>
{
    async fn next(&mut self) -> Option<Result<Value, Error>> {
        let fragment = self.inner.next().await?;

        Some(fragment.map_err(|err| err.into()))
    }
}

#[async_trait]
impl BackendClient for OllamaBackend {
    async fn models(&self) -> Result<Vec<ModelDescriptor>, Error> {
        let tags = self.api.tags().await?;

        let models: Vec<ModelDescriptor> = tags.into_iter().map(|t| t.into()).collect();

        Ok(models)
    }

    async fn forward(
        &self,
        op: Operation,
        body: Map<String, Value>,
        stream: bool,
    ) -> Result<Reply, Error> {
        if stream && op.can_stream() {
            let reply = self.api.stream(op, &body).await?;

            Ok(Reply::Streamed(Box::new(OllamaFragments { inner: reply })))
        } else {
            Ok(Reply::Whole(self.api.call(op, &body).await?))
        }
    }
}
