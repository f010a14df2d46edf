//! This module parses newline-delimited JSON from an HTTP response body. It
//! expects a byte stream, as produced by [`reqwest::Response::bytes_stream`],
//! which is incrementally parsed object by object. Nothing beyond the current
//! line is ever held in memory, so arbitrarily long replies can be relayed.
//!
//! See <https://github.com/ndjson/ndjson-spec>

use bytes::{Bytes, BytesMut};
use core::fmt;
use futures_core::stream::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::marker::Unpin;

use super::ReqwestError;

#[derive(Debug)]
pub(crate) enum Error {
    ResponseExceededBuffer,
    DeserializationFailed {
        line: String,
        error: serde_json::Error,
    },
    StreamFailed(ReqwestError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResponseExceededBuffer => write!(
                f,
                "a streamed line overflowed the buffer, this could indicate a misbehaving backend"
            ),
            Self::DeserializationFailed { line, error } => {
                write!(f, "failed to deserialize a streamed JSON object \"{}\": {}", line, error)
            }
            Self::StreamFailed(e) => write!(f, "the source stream failed: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::StreamFailed(e) => Some(e),
            Self::DeserializationFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct JsonStreamParser<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream: S,
    buf: BytesMut,
    max_size: usize,
    // Bytes of `buf` already known to contain no newline
    scanned: usize,
    exhausted: bool,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin> JsonStreamParser<S> {
    pub(crate) fn new(stream: S) -> JsonStreamParser<S> {
        Self::with_max_size_and_capacity(
            stream,
            1 << 24, // 16 MiB
            1 << 10, // 1 KiB
        )
    }

    pub(crate) fn with_max_size_and_capacity(
        stream: S,
        max_size: usize,
        init_capacity: usize,
    ) -> JsonStreamParser<S> {
        JsonStreamParser {
            stream,
            buf: BytesMut::with_capacity(init_capacity),
            max_size,
            scanned: 0,
            exhausted: false,
        }
    }

    async fn refill_buffer(&mut self) -> Result<bool, Error> {
        match self.stream.next().await {
            Some(Ok(b)) => {
                if b.len() + self.buf.len() > self.max_size {
                    return Err(Error::ResponseExceededBuffer);
                }

                self.buf.extend_from_slice(&b);

                Ok(true)
            }
            Some(Err(err)) => Err(Error::StreamFailed(err.into())),
            None => Ok(false),
        }
    }

    // Split the next complete line off the front of the buffer, without
    // the trailing [\r]\n
    fn take_line(&mut self) -> Option<Bytes> {
        let newline = self.buf[self.scanned..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let mut line = self.buf.split_to(self.scanned + offset + 1);
                self.scanned = 0;

                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }

                Some(line.freeze())
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    // A final line is allowed to omit its newline
    fn take_remainder(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }

        self.scanned = 0;
        let rest = self.buf.split().freeze();

        Some(rest)
    }

    async fn parse_line(&mut self) -> Option<Result<Bytes, Error>> {
        loop {
            let line = if self.exhausted {
                self.take_remainder()?
            } else if let Some(line) = self.take_line() {
                line
            } else {
                match self.refill_buffer().await {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.exhausted = true;
                        continue;
                    }
                    Err(err) => {
                        // Nothing after a failed read can be trusted
                        self.exhausted = true;
                        self.buf.clear();
                        return Some(Err(err));
                    }
                }
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Some(Ok(line));
        }
    }

    pub(crate) async fn parse<T: DeserializeOwned>(&mut self) -> Option<Result<T, Error>> {
        let line = match self.parse_line().await? {
            Ok(line) => line,
            Err(err) => return Some(Err(err)),
        };

        Some(
            serde_json::from_slice(&line).map_err(|error| Error::DeserializationFailed {
                line: String::from_utf8_lossy(&line).into_owned(),
                error,
            }),
        )
    }
}
