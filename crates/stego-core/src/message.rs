//! Pure functions over bytes, with no socket I/O: builds and parses
//! HTTP/1.1 request and response wire formats byte-exactly, and knows about
//! chunked transfer encoding. Incremental reassembly from a live socket is
//! the job of the proxy handlers in `stego-proxy`; this module only ever
//! sees byte slices it's handed.

use crate::error::ProtocolError;
use crate::headers::HeaderMap;

const CRLF: &[u8] = b"\r\n";
/// Matches the source's `_get_waitable_lists`/`recv` buffer size and gives
/// httparse a generous, fixed header-count ceiling.
const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub chunked: bool,
}

/// A parsed request line + header block, and how many bytes of the input
/// buffer it consumed (the offset where the body begins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
}

fn version_str(minor: u8) -> String {
    format!("HTTP/1.{minor}")
}

/// Parses a request line + header block from the front of `buf`. Returns
/// `Ok(None)` if the buffer doesn't yet contain a complete header block
/// (the caller should read more and retry), and `Err` on malformed input.
pub fn parse_request_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, ProtocolError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut storage);
    let status = req
        .parse(buf)
        .map_err(|_| ProtocolError::MalformedRequestLine)?;
    let consumed = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let method = req
        .method
        .ok_or(ProtocolError::MalformedRequestLine)?
        .to_string();
    let target = req
        .path
        .ok_or(ProtocolError::MalformedRequestLine)?
        .to_string();
    let version = version_str(req.version.ok_or(ProtocolError::MalformedRequestLine)?);

    let mut headers = HeaderMap::with_capacity(req.headers.len());
    for h in req.headers.iter() {
        let value = std::str::from_utf8(h.value).map_err(|_| ProtocolError::MalformedHeaders)?;
        headers.append(h.name, value);
    }

    Ok(Some((
        RequestHead {
            method,
            target,
            version,
            headers,
        },
        consumed,
    )))
}

/// Symmetric to [`parse_request_head`], for status lines.
pub fn parse_response_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, ProtocolError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut storage);
    let status = resp
        .parse(buf)
        .map_err(|_| ProtocolError::MalformedStatusLine)?;
    let consumed = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let code = resp.code.ok_or(ProtocolError::MalformedStatusLine)?;
    let reason = resp.reason.unwrap_or("").to_string();
    let version = version_str(resp.version.ok_or(ProtocolError::MalformedStatusLine)?);

    let mut headers = HeaderMap::with_capacity(resp.headers.len());
    for h in resp.headers.iter() {
        let value = std::str::from_utf8(h.value).map_err(|_| ProtocolError::MalformedHeaders)?;
        headers.append(h.name, value);
    }

    Ok(Some((
        ResponseHead {
            version,
            status: code,
            reason,
            headers,
        },
        consumed,
    )))
}

/// Parses a complete, already-buffered request (head + body sized by
/// `Content-Length`, defaulting to 0). Used for the byte-exactness
/// round-trip and wherever a whole message is already in memory.
pub fn parse_request(buf: &[u8]) -> Result<HttpRequest, ProtocolError> {
    let (head, consumed) = parse_request_head(buf)?.ok_or(ProtocolError::Incomplete)?;
    let content_length = head.headers.content_length().unwrap_or(0);
    let body = buf
        .get(consumed..consumed + content_length)
        .ok_or(ProtocolError::Incomplete)?
        .to_vec();
    Ok(HttpRequest {
        method: head.method,
        target: head.target,
        version: head.version,
        headers: head.headers,
        body,
    })
}

/// Parses a complete, already-buffered, non-chunked response.
pub fn parse_response(buf: &[u8]) -> Result<HttpResponse, ProtocolError> {
    let (head, consumed) = parse_response_head(buf)?.ok_or(ProtocolError::Incomplete)?;
    let chunked = head.headers.is_chunked();
    let body = if chunked {
        buf.get(consumed..)
            .ok_or(ProtocolError::Incomplete)?
            .to_vec()
    } else {
        let content_length = head.headers.content_length().unwrap_or(0);
        buf.get(consumed..consumed + content_length)
            .ok_or(ProtocolError::Incomplete)?
            .to_vec()
    };
    Ok(HttpResponse {
        version: head.version,
        status: head.status,
        reason: head.reason,
        headers: head.headers,
        body,
        chunked,
    })
}

/// request line, CRLF, serialized header block, blank line, body.
pub fn build_request(
    method: &str,
    target: &str,
    version: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(method.len() + target.len() + version.len() + 16 + body.len());
    out.extend_from_slice(method.as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.push(b' ');
    out.extend_from_slice(version.as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(&headers.to_wire_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(body);
    out
}

/// status line, CRLF, serialized header block, blank line, body.
pub fn build_response(
    version: &str,
    status: u16,
    reason: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(version.len() + reason.len() + 16 + body.len());
    out.extend_from_slice(version.as_bytes());
    out.push(b' ');
    out.extend_from_slice(status.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(reason.as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(&headers.to_wire_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(body);
    out
}

/// Splits `seq` into chunks of at most `size` bytes each, in source order.
pub fn split_chunks(seq: &[u8], size: usize) -> Vec<&[u8]> {
    if size == 0 {
        return vec![seq];
    }
    seq.chunks(size).collect()
}

/// Encodes one HTTP chunk: hex length, CRLF, chunk, CRLF.
pub fn encode_chunk(chunk: &[u8]) -> Vec<u8> {
    let mut out = format!("{:X}\r\n", chunk.len()).into_bytes();
    out.extend_from_slice(chunk);
    out.extend_from_slice(CRLF);
    out
}

/// The terminating `0\r\n\r\n` chunk.
pub fn end_of_chunks() -> &'static [u8] {
    b"0\r\n\r\n"
}

/// Decodes one chunk from the front of `buf` (size line + data + trailing
/// CRLF). Returns `Ok(None)` if `buf` doesn't yet hold a complete chunk,
/// `Ok(Some((None, consumed)))` on the terminating zero-length chunk, and
/// `Ok(Some((Some(data), consumed)))` otherwise.
pub fn try_decode_chunk(buf: &[u8]) -> Result<Option<(Option<Vec<u8>>, usize)>, ProtocolError> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    let size_line =
        std::str::from_utf8(&buf[..line_end]).map_err(|_| ProtocolError::MalformedHeaders)?;
    // Chunk extensions (";name=value") are not produced by this proxy; strip
    // them defensively before parsing the size.
    let size_str = size_line.split(';').next().unwrap_or(size_line).trim();
    let size = usize::from_str_radix(size_str, 16).map_err(|_| ProtocolError::MalformedHeaders)?;

    let data_start = line_end + 2;
    let data_end = data_start + size;
    let trailer_end = data_end + 2;
    if buf.len() < trailer_end {
        return Ok(None);
    }

    if size == 0 {
        return Ok(Some((None, trailer_end)));
    }
    Ok(Some((Some(buf[data_start..data_end].to_vec()), trailer_end)))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Wraps `medium` as the body of a synthesized `POST / HTTP/1.1` carrying
/// `Host: <remote>`, `Connection: keep-alive`, and either `Content-Length`
/// or `Transfer-Encoding: chunked`.
pub fn build_stego_request(remote_host: &str, medium: &[u8], chunked: bool) -> Vec<u8> {
    let mut headers = HeaderMap::new();
    headers.append("Host", remote_host);
    headers.append("Connection", "keep-alive");
    if chunked {
        headers.append("Transfer-Encoding", "chunked");
    } else {
        headers.append("Content-Length", medium.len().to_string());
    }
    build_request("POST", "/", "HTTP/1.1", &headers, medium)
}

/// Symmetric to [`build_stego_request`], for the stego-server's reply.
pub fn build_stego_response(remote_host: &str, medium: &[u8], chunked: bool) -> Vec<u8> {
    let mut headers = HeaderMap::new();
    headers.append("Host", remote_host);
    headers.append("Connection", "keep-alive");
    if chunked {
        headers.append("Transfer-Encoding", "chunked");
    } else {
        headers.append("Content-Length", medium.len().to_string());
    }
    build_response("HTTP/1.1", 200, "OK", &headers, medium)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_byte_exactly() {
        let mut headers = HeaderMap::new();
        headers.append("Host", "origin.test");
        headers.append("Content-Length", "5");
        let body = b"hello".to_vec();
        let wire = build_request("GET", "/", "HTTP/1.1", &headers, &body);

        let parsed = parse_request(&wire).unwrap();
        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.target, "/");
        assert_eq!(parsed.version, "HTTP/1.1");
        assert_eq!(parsed.body, body);
        assert_eq!(parsed.headers.get("host"), Some("origin.test"));
    }

    #[test]
    fn response_round_trips_byte_exactly() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Length", "5");
        let wire = build_response("HTTP/1.1", 200, "OK", &headers, b"hello");
        let parsed = parse_response(&wire).unwrap();
        assert_eq!(parsed.status, 200);
        assert_eq!(parsed.reason, "OK");
        assert_eq!(parsed.body, b"hello");
        assert!(!parsed.chunked);
    }

    #[test]
    fn empty_body_passes_through() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Length", "0");
        let wire = build_request("GET", "/", "HTTP/1.1", &headers, b"");
        let parsed = parse_request(&wire).unwrap();
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn chunk_round_trip_reassembles_source_order() {
        let payload = b"abcdefghij".to_vec();
        let pieces = split_chunks(&payload, 4);
        let mut wire = Vec::new();
        for piece in &pieces {
            wire.extend(encode_chunk(piece));
        }
        wire.extend_from_slice(end_of_chunks());

        let mut cursor = &wire[..];
        let mut reassembled = Vec::new();
        loop {
            let (chunk, consumed) = try_decode_chunk(cursor).unwrap().unwrap();
            cursor = &cursor[consumed..];
            match chunk {
                Some(data) => reassembled.extend(data),
                None => break,
            }
        }
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn incomplete_chunk_reports_none() {
        assert!(try_decode_chunk(b"5\r\nhel").unwrap().is_none());
    }
}
