//! Line framing codecs for supervisor-store communication.
//!
//! Wraps LinesCodec and adds serialization per direction: requests are
//! single-line JSON, replies are raw trimmed lines mapped to [`Reply`].
//! Works over any AsyncRead/AsyncWrite (pipes, in-memory duplex).

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::protocol::{self, Incoming, Reply, Request};

fn into_io_error(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::Io(err) => err,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line too long")
        }
    }
}

/// Supervisor → store direction: encodes [`Request`] as one JSON line,
/// decodes (on the store side) incoming lines into [`Incoming`].
pub struct RequestCodec {
    inner: LinesCodec,
}

impl RequestCodec {
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new(),
        }
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Request> for RequestCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.encode(json, dst).map_err(into_io_error)
    }
}

impl Decoder for RequestCodec {
    type Item = Incoming;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src).map_err(into_io_error)? {
            Some(line) => Ok(Some(protocol::parse_request_line(&line))),
            None => Ok(None),
        }
    }
}

/// Store → supervisor direction: raw reply lines, typed as [`Reply`].
///
/// An empty reply line is a protocol violation, distinct from a closed pipe
/// (which surfaces as end-of-stream on the framed reader).
pub struct ReplyCodec {
    inner: LinesCodec,
}

impl ReplyCodec {
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new(),
        }
    }
}

impl Default for ReplyCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ReplyCodec {
    type Item = Reply;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src).map_err(into_io_error)? {
            Some(line) => {
                let line = line.trim();
                if line.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "empty reply line",
                    ));
                }
                Ok(Some(Reply::parse(line)))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Reply> for ReplyCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(item.as_text(), dst).map_err(into_io_error)
    }
}
