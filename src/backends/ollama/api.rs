use bytes::Bytes;
use futures_core::Stream;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::backends::apireq::{
    self, JsonStreamError, JsonStreamParser, ReqwestResponseStreamExt, Url,
};
use crate::backends::Operation;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub(super) enum Error {
    #[error("invalid ollama api base: {0}")]
    InvalidApiBase(#[source] url::ParseError),

    #[error("invalid ollama endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("failed to build the http client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("a request to ollama failed: {0}")]
    RequestFailed(#[from] apireq::ReqwestError),

    #[error("ollama did not respond within {0:?}")]
    TimedOut(Duration),

    #[error("failed to query ollama resource: {0}")]
    NotFound(String),

    #[error("request to the ollama api failed: {0}")]
    BadRequest(String),

    #[error("ollama encountered an internal error: {0}")]
    InternalError(String),

    #[error("the ollama API returned an unspecified error: {0}")]
    UnspecifiedError(String),

    #[error("could not parse streamed response: {0}")]
    StreamParser(#[from] JsonStreamError),
}

// Structures to deserialize /api/tags

#[derive(Debug, Deserialize)]
pub(super) struct Tag {
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TagsList {
    #[serde(default)]
    models: Vec<Tag>,
}

// Errors
#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

// A line of a streamed reply is either a fragment or an error report
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StreamChunk {
    Error(ApiError),
    Fragment(Value),
}

pub(super) struct StreamingResponse<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream: JsonStreamParser<S>,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin> StreamingResponse<S> {
    pub(super) async fn next(&mut self) -> Option<Result<Value, Error>> {
        let chunk = self.stream.parse::<StreamChunk>().await?;

        Some(
            chunk
                .map_err(Error::StreamParser)
                .and_then(|chunk| match chunk {
                    StreamChunk::Fragment(fragment) => Ok(fragment),
                    StreamChunk::Error(e) => Err(Error::UnspecifiedError(e.error)),
                }),
        )
    }
}

pub(super) struct OllamaApi {
    api_base: Url,
    client: Client,
    request_timeout: Duration,
}

impl OllamaApi {
    pub(super) fn with_api_base(api_base: &str, request_timeout: Duration) -> Result<OllamaApi, Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(Error::ClientBuild)?;

        Ok(OllamaApi {
            api_base: Url::parse(api_base).map_err(Error::InvalidApiBase)?,
            client,
            request_timeout,
        })
    }

    async fn maybe_parse_api_error(res: Response) -> Result<Response, Error> {
        let status = res.status();

        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.map_err(|e| Error::RequestFailed(e.into()))?;

        // Ollama reports errors as {"error": "..."}, but proxies in front of
        // it may not
        let message = match serde_json::from_str::<ApiError>(&body) {
            Ok(err) => err.error,
            Err(_) if body.trim().is_empty() => status.to_string(),
            Err(_) => body,
        };

        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(message)),
            code => match code.as_u16() {
                400..=499 => Err(Error::BadRequest(message)),
                500..=599 => Err(Error::InternalError(message)),
                _ => Err(Error::UnspecifiedError(message)),
            },
        }
    }

    /// Sends the request, bounding the wait for the response head.
    async fn send(&self, req: RequestBuilder) -> Result<Response, Error> {
        let res = tokio::time::timeout(self.request_timeout, req.send())
            .await
            .map_err(|_| Error::TimedOut(self.request_timeout))?
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Self::maybe_parse_api_error(res).await
    }

    pub(super) async fn tags(&self) -> Result<Vec<Tag>, Error> {
        let url = self.api_base.join("/api/tags")?;

        let res = self
            .send(self.client.get(url).timeout(self.request_timeout))
            .await?;

        let tags: TagsList = res
            .json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Ok(tags.models)
    }

    /// Performs the operation and waits for the complete result.
    pub(super) async fn call(&self, op: Operation, body: &Map<String, Value>) -> Result<Value, Error> {
        let url = self.api_base.join(op.path())?;

        let res = self
            .send(
                self.client
                    .post(url)
                    .json(body)
                    .timeout(self.request_timeout),
            )
            .await?;

        res.json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))
    }

    /// Performs the operation and returns the reply as it is produced. Only
    /// the wait for the response head is bounded; the body may take as long
    /// as the model needs.
    pub(super) async fn stream(
        &self,
        op: Operation,
        body: &Map<String, Value>,
    ) -> Result<StreamingResponse<impl Stream<Item = reqwest::Result<Bytes>> + Unpin + Send>, Error>
    {
        let url = self.api_base.join(op.path())?;

        let res = self.send(self.client.post(url).json(body)).await?;

        Ok(StreamingResponse {
            stream: res.stream_ndjson(),
        })
    }
}
