//! Content-encoding detection and lazy decompression
//!
//! Decoding wraps the body stream; nothing is buffered here. Chunks are
//! inflated as the consumer pulls them, so the same adapter serves both
//! streaming and fully-buffered coercions.

use crate::coerce::BodyStream;
use bytes::Bytes;
use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};
use futures::stream::{self, StreamExt};
use http::header::CONTENT_ENCODING;
use http::HeaderMap;
use std::io::{self, Write};

/// Encodings the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Deflate,
    Identity,
}

impl ContentEncoding {
    /// Detect the encoding from response headers. With stacked encodings the
    /// last one applied is the first to undo; `identity` is a no-op and
    /// skipped, so `gzip, identity` is gzip.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get_all(CONTENT_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty() && !token.eq_ignore_ascii_case("identity"))
            .last()
            .map_or(ContentEncoding::Identity, Self::from_token)
    }

    fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            ContentEncoding::Gzip
        } else if token.eq_ignore_ascii_case("deflate") {
            ContentEncoding::Deflate
        } else {
            ContentEncoding::Identity
        }
    }
}

/// Wrap `body` so that reading it yields decompressed bytes.
pub fn decode_body(encoding: ContentEncoding, body: BodyStream) -> BodyStream {
    match encoding {
        ContentEncoding::Identity => body,
        ContentEncoding::Gzip => inflate(body, Inflater::Gzip(GzDecoder::new(Vec::new()))),
        ContentEncoding::Deflate => inflate(body, Inflater::PendingDeflate(Vec::new())),
    }
}

fn inflate(raw: BodyStream, inflater: Inflater) -> BodyStream {
    BodyStream::new(stream::unfold(
        (raw, Some(inflater), false),
        |(mut raw, mut inflater, mut seen_input)| async move {
            let active = inflater.as_mut()?;
            loop {
                match raw.next().await {
                    Some(Ok(chunk)) => {
                        seen_input |= !chunk.is_empty();
                        match active.feed(&chunk) {
                            Ok(out) if out.is_empty() => continue,
                            Ok(out) => return Some((Ok(out), (raw, inflater, seen_input))),
                            Err(e) => return Some((Err(e), (raw, None, seen_input))),
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), (raw, None, seen_input))),
                    // An empty body carries no compression framing at all.
                    None if !seen_input => return None,
                    None => {
                        return match active.finish() {
                            Ok(out) if out.is_empty() => None,
                            tail => Some((tail, (raw, None, seen_input))),
                        };
                    }
                }
            }
        },
    ))
}

/// Incremental decompressor state.
enum Inflater {
    Gzip(GzDecoder<Vec<u8>>),
    /// `deflate` is sent both zlib-wrapped and raw in the wild; hold bytes
    /// until the header can be sniffed.
    PendingDeflate(Vec<u8>),
    Zlib(ZlibDecoder<Vec<u8>>),
    Raw(DeflateDecoder<Vec<u8>>),
}

impl Inflater {
    fn feed(&mut self, chunk: &[u8]) -> io::Result<Bytes> {
        match self {
            Inflater::Gzip(decoder) => {
                decoder.write_all(chunk)?;
                Ok(drain(decoder.get_mut()))
            }
            Inflater::Zlib(decoder) => {
                decoder.write_all(chunk)?;
                Ok(drain(decoder.get_mut()))
            }
            Inflater::Raw(decoder) => {
                decoder.write_all(chunk)?;
                Ok(drain(decoder.get_mut()))
            }
            Inflater::PendingDeflate(held) => {
                held.extend_from_slice(chunk);
                if held.len() < 2 {
                    return Ok(Bytes::new());
                }
                let held = std::mem::take(held);
                *self = if is_zlib_header(held[0], held[1]) {
                    Inflater::Zlib(ZlibDecoder::new(Vec::new()))
                } else {
                    Inflater::Raw(DeflateDecoder::new(Vec::new()))
                };
                self.feed(&held)
            }
        }
    }

    fn finish(&mut self) -> io::Result<Bytes> {
        match self {
            Inflater::Gzip(decoder) => {
                decoder.try_finish()?;
                Ok(drain(decoder.get_mut()))
            }
            Inflater::Zlib(decoder) => {
                decoder.try_finish()?;
                Ok(drain(decoder.get_mut()))
            }
            Inflater::Raw(decoder) => {
                decoder.try_finish()?;
                Ok(drain(decoder.get_mut()))
            }
            Inflater::PendingDeflate(held) if held.is_empty() => Ok(Bytes::new()),
            Inflater::PendingDeflate(_) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "deflate stream ended before its header",
            )),
        }
    }
}

fn drain(buf: &mut Vec<u8>) -> Bytes {
    Bytes::from(std::mem::take(buf))
}

/// RFC 1950 header check: deflate method, 32K window max, FCHECK multiple of 31.
fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use http::HeaderValue;

    const TEXT: &[u8] = b"the quick brown fox jumps over the lazy dog, twice: the quick brown fox";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn chunked(data: Vec<u8>, size: usize) -> BodyStream {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        BodyStream::new(stream::iter(chunks))
    }

    fn headers(encoding: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_str(encoding).unwrap());
        headers
    }

    #[test]
    fn test_detect_encoding() {
        assert_eq!(ContentEncoding::from_headers(&headers("gzip")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_headers(&headers("GZIP")), ContentEncoding::Gzip);
        assert_eq!(
            ContentEncoding::from_headers(&headers("Deflate")),
            ContentEncoding::Deflate
        );
        assert_eq!(ContentEncoding::from_headers(&headers("br")), ContentEncoding::Identity);
        assert_eq!(
            ContentEncoding::from_headers(&HeaderMap::new()),
            ContentEncoding::Identity
        );
    }

    #[test]
    fn test_identity_in_stacked_encodings_is_skipped() {
        assert_eq!(
            ContentEncoding::from_headers(&headers("gzip, identity")),
            ContentEncoding::Gzip
        );
        assert_eq!(
            ContentEncoding::from_headers(&headers("identity")),
            ContentEncoding::Identity
        );

        let mut stacked = headers("deflate");
        stacked.append(CONTENT_ENCODING, HeaderValue::from_static("Identity"));
        assert_eq!(ContentEncoding::from_headers(&stacked), ContentEncoding::Deflate);
    }

    #[tokio::test]
    async fn test_gzip_in_small_chunks() {
        let body = decode_body(ContentEncoding::Gzip, chunked(gzip(TEXT), 3));
        assert_eq!(body.bytes().await.unwrap(), TEXT);
    }

    #[tokio::test]
    async fn test_deflate_zlib_wrapped() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(TEXT).unwrap();
        let body = decode_body(ContentEncoding::Deflate, chunked(encoder.finish().unwrap(), 1));
        assert_eq!(body.bytes().await.unwrap(), TEXT);
    }

    #[tokio::test]
    async fn test_deflate_raw() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(TEXT).unwrap();
        let body = decode_body(ContentEncoding::Deflate, chunked(encoder.finish().unwrap(), 16));
        assert_eq!(body.bytes().await.unwrap(), TEXT);
    }

    #[tokio::test]
    async fn test_identity_passthrough() {
        let body = decode_body(ContentEncoding::Identity, chunked(TEXT.to_vec(), 8));
        assert_eq!(body.bytes().await.unwrap(), TEXT);
    }

    #[tokio::test]
    async fn test_empty_compressed_body() {
        let body = decode_body(ContentEncoding::Gzip, chunked(Vec::new(), 1));
        assert!(body.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_gzip_fails() {
        let mut wire = gzip(TEXT);
        wire.truncate(wire.len() / 2);
        let body = decode_body(ContentEncoding::Gzip, chunked(wire, 4));
        assert!(body.bytes().await.is_err());
    }
}
