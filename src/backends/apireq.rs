//! Helpers for making API requests to a backend and parsing what comes back.

mod error;
mod json_stream_parser;
mod stream_ext;

pub(crate) use error::Error as ReqwestError;
pub(crate) use reqwest::Url;

pub(crate) use json_stream_parser::Error as JsonStreamError;
pub(crate) use json_stream_parser::JsonStreamParser;
pub(crate) use stream_ext::ReqwestResponseStreamExt;
