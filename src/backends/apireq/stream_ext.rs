use super::JsonStreamParser;
use futures_util::Stream;
use std::marker::Unpin;

pub(crate) trait ReqwestResponseStreamExt {
    /// Parse the body of the response as newline-delimited JSON, one
    /// document per line.
    fn stream_ndjson(
        self,
    ) -> JsonStreamParser<impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin + Send>;
}

impl ReqwestResponseStreamExt for reqwest::Response {
    fn stream_ndjson(
        self,
    ) -> JsonStreamParser<impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin + Send>
    {
        JsonStreamParser::new(self.bytes_stream())
    }
}
