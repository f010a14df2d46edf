//! Wrapper around Reqwest's error type to facilitate exclusive matching, and
//! the conversions from transport-level errors into backend errors.

use std::error::Error as StdError;
use std::fmt;

use super::JsonStreamError;
use crate::backends::{Error as BackendError, ErrorKind as BackendErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    ConnectFailed,
    DecodingFailed,
    RedirectPolicyViolated,
    TimedOut,
    UnknownReqwestError,
}

#[derive(Debug)]
pub(crate) struct Error {
    kind: ErrorKind,
    source: reqwest::Error,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_decode() {
            ErrorKind::DecodingFailed
        } else if err.is_timeout() {
            ErrorKind::TimedOut
        } else if err.is_redirect() {
            ErrorKind::RedirectPolicyViolated
        } else if err.is_connect() {
            ErrorKind::ConnectFailed
        } else {
            ErrorKind::UnknownReqwestError
        };

        Error { kind, source: err }
    }
}

impl Error {
    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ErrorKind::ConnectFailed => "could not connect to the backend",
            ErrorKind::DecodingFailed => "could not decode the response body",
            ErrorKind::RedirectPolicyViolated => "the backend redirected too often",
            ErrorKind::TimedOut => "the backend did not answer in time",
            ErrorKind::UnknownReqwestError => "the http request failed",
        };

        write!(f, "{}: {}", what, self.source)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<Error> for BackendError {
    fn from(value: Error) -> Self {
        let kind = match value.kind() {
            ErrorKind::ConnectFailed => BackendErrorKind::Connection,
            ErrorKind::DecodingFailed | ErrorKind::RedirectPolicyViolated => {
                BackendErrorKind::UnexpectedResponse
            }
            ErrorKind::TimedOut => BackendErrorKind::TimedOut,
            ErrorKind::UnknownReqwestError => BackendErrorKind::UnspecifiedError,
        };

        BackendError::from_source(kind, Box::new(value))
    }
}

impl From<JsonStreamError> for BackendError {
    fn from(value: JsonStreamError) -> Self {
        let kind = match &value {
            JsonStreamError::DeserializationFailed { .. } | JsonStreamError::ResponseExceededBuffer => {
                BackendErrorKind::UnexpectedResponse
            }
            // The body was cut off; usually the backend went away mid-reply.
            JsonStreamError::StreamFailed(err) => match err.kind() {
                ErrorKind::TimedOut => BackendErrorKind::TimedOut,
                ErrorKind::ConnectFailed => BackendErrorKind::Connection,
                _ => BackendErrorKind::UnspecifiedError,
            },
        };

        BackendError::from_source(kind, Box::new(value))
    }
}
