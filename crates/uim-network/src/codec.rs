//! Tokio codec for newline-delimited JSON messages.
//!
//! Each frame is one JSON document followed by `\n`. The decoded and the
//! encoded types are independent, so the same codec serves both ends:
//!
//! ```text
//! daemon: Framed<UnixStream, ServerCodec>   decodes Request,  encodes Response
//! client: Framed<UnixStream, ClientCodec>   decodes Response, encodes Request
//! ```
//!
//! Frames longer than the maximum frame size are rejected without waiting
//! for the terminating newline.

use crate::error::{ProtocolError, Result};
use crate::message::{Request, Response};
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum frame size in bytes (64 KB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

const DELIMITER: u8 = b'\n';

/// Codec decoding `D` and encoding `E` as JSON lines.
#[derive(Debug)]
pub struct JsonLinesCodec<D, E> {
    max_frame_size: usize,
    /// Bytes already searched for the delimiter.
    scanned: usize,
    _types: PhantomData<fn(E) -> D>,
}

pub type ServerCodec = JsonLinesCodec<Request, Response>;
pub type ClientCodec = JsonLinesCodec<Response, Request>;

impl<D, E> JsonLinesCodec<D, E> {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            scanned: 0,
            _types: PhantomData,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<D, E> Default for JsonLinesCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned, E> Decoder for JsonLinesCodec<D, E> {
    type Item = D;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let start = self.scanned.min(src.len());
            let Some(offset) = src[start..].iter().position(|b| *b == DELIMITER) else {
                if src.len() > self.max_frame_size {
                    return Err(ProtocolError::FrameTooLarge {
                        size: src.len(),
                        max: self.max_frame_size,
                    });
                }
                self.scanned = src.len();
                return Ok(None);
            };

            let end = start + offset;
            self.scanned = 0;

            if end > self.max_frame_size {
                return Err(ProtocolError::FrameTooLarge {
                    size: end,
                    max: self.max_frame_size,
                });
            }

            let line = src.split_to(end + 1);
            let line = line[..end].trim_ascii();

            // Blank lines are keep-alives.
            if line.is_empty() {
                continue;
            }

            return Ok(Some(serde_json::from_slice(line)?));
        }
    }
}

impl<D, E: Serialize> Encoder<E> for JsonLinesCodec<D, E> {
    type Error = ProtocolError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        serde_json::to_writer((&mut *dst).writer(), &item)?;

        let size = dst.len() - start;
        if size > self.max_frame_size {
            dst.truncate(start);
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        dst.put_u8(DELIMITER);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uim_core::{IdentifiedUser, SeatId};

    #[test]
    fn test_codec_default() {
        let codec = ServerCodec::default();
        assert_eq!(codec.max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_decode_complete_message() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"GetSources\"}\n"[..]);

        let request = codec.decode(&mut buf).unwrap();

        assert_eq!(request, Some(Request::GetSources));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_message() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"GetSo"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"urces\"}\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Request::GetSources));
    }

    #[test]
    fn test_decode_multiple_messages_in_buffer() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::from(
            &b"{\"type\":\"GetSources\"}\n\n{\"type\":\"Monitor\"}\r\n{\"type\""[..],
        );

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Request::GetSources));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Request::Monitor));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"{\"type\"");
    }

    #[test]
    fn test_decode_empty_buffer() {
        let mut codec = ClientCodec::new();
        let mut buf = BytesMut::new();
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_invalid_json() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"Reboot\"}\n"[..]);

        let result = codec.decode(&mut buf);

        assert!(matches!(result, Err(ProtocolError::Json(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_frame_too_large_without_delimiter() {
        let mut codec = ServerCodec::with_max_frame_size(16);
        let mut buf = BytesMut::from(&[b'x'; 17][..]);

        let result = codec.decode(&mut buf);

        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 17, max: 16 })
        ));
    }

    #[test]
    fn test_decode_frame_too_large_with_delimiter() {
        let mut codec = ServerCodec::with_max_frame_size(8);
        let mut buf = BytesMut::from(&b"{\"type\":\"GetSources\"}\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge { max: 8, .. })
        ));
    }

    #[test]
    fn test_encode_appends_delimiter() {
        let mut codec = ClientCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(Request::Monitor, &mut buf).unwrap();

        assert_eq!(&buf[..], b"{\"type\":\"Monitor\"}\n");
    }

    #[test]
    fn test_encode_frame_too_large_leaves_buffer_untouched() {
        let mut codec = ServerCodec::with_max_frame_size(16);
        let mut buf = BytesMut::from(&b"kept"[..]);
        let response = Response::UserIdentified {
            user: IdentifiedUser::new("SCARD-04a1b2c3d4e5f6", SeatId::MAIN_USER),
        };

        assert!(codec.encode(response, &mut buf).is_err());
        assert_eq!(&buf[..], b"kept");
    }

    #[test]
    fn test_client_decodes_what_server_encodes() {
        let mut server = ServerCodec::new();
        let mut client = ClientCodec::new();
        let mut buf = BytesMut::new();
        let response = Response::IdentifiedUsers {
            users: vec![
                IdentifiedUser::new("MSD-1234", SeatId::new(0x5678)),
                IdentifiedUser::new("SCARD-12ab", SeatId::MAIN_USER),
            ],
        };

        server.encode(response.clone(), &mut buf).unwrap();

        assert_eq!(client.decode(&mut buf).unwrap(), Some(response));
    }
}
