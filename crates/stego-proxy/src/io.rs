//! Incremental reading of a full HTTP message off a [`Connection`], built on
//! top of `stego_core::message`'s pure parsing functions. The framer knows
//! nothing about sockets; this module is where byte I/O meets it.

use stego_core::error::{ProtocolError, ProxyError, TransportError};
use stego_core::message::{
    parse_request_head, parse_response_head, try_decode_chunk, HttpRequest, HttpResponse, RequestHead,
    ResponseHead,
};

use crate::connection::Connection;

const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Reads and parses a complete request (head + body sized by
/// `Content-Length`) from `conn`, growing an internal buffer until
/// `parse_request_head` succeeds.
pub async fn read_request(conn: &mut Connection) -> Result<HttpRequest, ProxyError> {
    let mut buf = Vec::new();
    let (head, consumed) = loop {
        if let Some(found) = parse_request_head(&buf)? {
            break found;
        }
        read_more(conn, &mut buf).await?;
    };
    buf.drain(..consumed);

    let content_length = head.headers.content_length().unwrap_or(0);
    let body = read_fixed_body(conn, &mut buf, content_length).await?;

    Ok(HttpRequest {
        method: head.method,
        target: head.target,
        version: head.version,
        headers: head.headers,
        body,
    })
}

/// Reads and parses a complete response (head + body, honoring
/// `Content-Length` or chunked framing) from `conn`.
pub async fn read_response(conn: &mut Connection) -> Result<HttpResponse, ProxyError> {
    let mut buf = Vec::new();
    let (head, consumed) = loop {
        if let Some(found) = parse_response_head(&buf)? {
            break found;
        }
        read_more(conn, &mut buf).await?;
    };
    buf.drain(..consumed);

    let chunked = head.headers.is_chunked();
    let body = if chunked {
        read_chunked_body(conn, &mut buf).await?
    } else {
        let content_length = head.headers.content_length().unwrap_or(0);
        read_fixed_body(conn, &mut buf, content_length).await?
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

/// Reads a covert POST's head and its sequence of raw stego media: one
/// medium per wire chunk when `Transfer-Encoding: chunked`, or the whole
/// body as a single medium otherwise. Unlike [`read_request`], chunk
/// boundaries are preserved rather than concatenated, since each chunk is
/// independently `codec.extract`-able and concatenating first would merge
/// distinct image files into one unparsable blob.
pub async fn read_covert_request(conn: &mut Connection) -> Result<(RequestHead, Vec<Vec<u8>>), ProxyError> {
    let mut buf = Vec::new();
    let (head, consumed) = loop {
        if let Some(found) = parse_request_head(&buf)? {
            break found;
        }
        read_more(conn, &mut buf).await?;
    };
    buf.drain(..consumed);

    let media = if head.headers.is_chunked() {
        read_chunked_media(conn, &mut buf).await?
    } else {
        let content_length = head.headers.content_length().unwrap_or(0);
        vec![read_fixed_body(conn, &mut buf, content_length).await?]
    };
    Ok((head, media))
}

/// Symmetric to [`read_covert_request`], for the stego-server's reply.
pub async fn read_covert_response(conn: &mut Connection) -> Result<(ResponseHead, Vec<Vec<u8>>), ProxyError> {
    let mut buf = Vec::new();
    let (head, consumed) = loop {
        if let Some(found) = parse_response_head(&buf)? {
            break found;
        }
        read_more(conn, &mut buf).await?;
    };
    buf.drain(..consumed);

    let media = if head.headers.is_chunked() {
        read_chunked_media(conn, &mut buf).await?
    } else {
        let content_length = head.headers.content_length().unwrap_or(0);
        vec![read_fixed_body(conn, &mut buf, content_length).await?]
    };
    Ok((head, media))
}

async fn read_chunked_media(conn: &mut Connection, buf: &mut Vec<u8>) -> Result<Vec<Vec<u8>>, ProxyError> {
    let mut media = Vec::new();
    loop {
        loop {
            match try_decode_chunk(buf)? {
                Some((Some(chunk), consumed)) => {
                    media.push(chunk);
                    buf.drain(..consumed);
                }
                Some((None, consumed)) => {
                    buf.drain(..consumed);
                    return Ok(media);
                }
                None => break,
            }
        }
        read_more(conn, buf).await?;
    }
}

async fn read_more(conn: &mut Connection, buf: &mut Vec<u8>) -> Result<(), ProxyError> {
    if buf.len() > MAX_HEAD_SIZE {
        return Err(ProtocolError::Incomplete.into());
    }
    match conn.recv().await? {
        Some(chunk) => {
            buf.extend_from_slice(&chunk);
            Ok(())
        }
        None => Err(TransportError::Closed.into()),
    }
}

async fn read_fixed_body(
    conn: &mut Connection,
    buf: &mut Vec<u8>,
    want: usize,
) -> Result<Vec<u8>, ProxyError> {
    while buf.len() < want {
        read_more(conn, buf).await?;
    }
    let body = buf[..want].to_vec();
    buf.drain(..want);
    Ok(body)
}

async fn read_chunked_body(conn: &mut Connection, buf: &mut Vec<u8>) -> Result<Vec<u8>, ProxyError> {
    let mut body = Vec::new();
    loop {
        loop {
            match try_decode_chunk(buf)? {
                Some((Some(chunk), consumed)) => {
                    body.extend_from_slice(&chunk);
                    buf.drain(..consumed);
                }
                Some((None, consumed)) => {
                    buf.drain(..consumed);
                    return Ok(body);
                }
                None => break,
            }
        }
        read_more(conn, buf).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Role;
    use stego_core::headers::HeaderMap;
    use stego_core::message::{build_request, build_response, encode_chunk, end_of_chunks};
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client_res, server_res) =
            tokio::join!(tokio::net::TcpStream::connect(addr), async { listener.accept().await });
        let client = Connection::new(Role::Client, client_res.unwrap());
        let (server_socket, _) = server_res.unwrap();
        let server = Connection::new(Role::Server, server_socket);
        (client, server)
    }

    #[tokio::test]
    async fn reads_request_with_content_length_body() {
        let (mut writer, mut reader) = pair().await;
        let mut headers = HeaderMap::new();
        headers.append("Host", "example.test");
        headers.append("Content-Length", "5");
        let wire = build_request("POST", "/", "HTTP/1.1", &headers, b"hello");

        writer.send_all(&wire).await.unwrap();
        let request = read_request(&mut reader).await.unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.body, b"hello");
    }

    #[tokio::test]
    async fn reads_response_with_chunked_body_flattened() {
        let (mut writer, mut reader) = pair().await;
        let mut headers = HeaderMap::new();
        headers.append("Transfer-Encoding", "chunked");
        let mut wire = build_response("HTTP/1.1", 200, "OK", &headers, b"");
        wire.extend(encode_chunk(b"ab"));
        wire.extend(encode_chunk(b"cd"));
        wire.extend_from_slice(end_of_chunks());

        writer.send_all(&wire).await.unwrap();
        let response = read_response(&mut reader).await.unwrap();

        assert!(response.chunked);
        assert_eq!(response.body, b"abcd");
    }

    #[tokio::test]
    async fn covert_request_preserves_chunk_boundaries_instead_of_concatenating() {
        let (mut writer, mut reader) = pair().await;
        let mut headers = HeaderMap::new();
        headers.append("Host", "stego-server.test");
        headers.append("Transfer-Encoding", "chunked");
        let mut wire = build_request("POST", "/", "HTTP/1.1", &headers, b"");
        wire.extend(encode_chunk(b"first-medium"));
        wire.extend(encode_chunk(b"second-medium"));
        wire.extend_from_slice(end_of_chunks());

        writer.send_all(&wire).await.unwrap();
        let (_head, media) = read_covert_request(&mut reader).await.unwrap();

        assert_eq!(media, vec![b"first-medium".to_vec(), b"second-medium".to_vec()]);
    }

    #[tokio::test]
    async fn covert_response_without_chunking_is_a_single_medium() {
        let (mut writer, mut reader) = pair().await;
        let mut headers = HeaderMap::new();
        headers.append("Content-Length", "11");
        let wire = build_response("HTTP/1.1", 200, "OK", &headers, b"lone-medium");

        writer.send_all(&wire).await.unwrap();
        let (_head, media) = read_covert_response(&mut reader).await.unwrap();

        assert_eq!(media, vec![b"lone-medium".to_vec()]);
    }

    #[tokio::test]
    async fn incomplete_head_errors_when_peer_closes() {
        let (mut writer, mut reader) = pair().await;
        writer.send_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        writer.close().await;

        assert!(read_request(&mut reader).await.is_err());
    }
}
