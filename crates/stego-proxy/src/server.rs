//! Internet-facing state machine: accepts covert POSTs from the stego-client,
//! unwraps and forwards the embedded request to the real origin, then wraps
//! the origin's response back into covert media. Also serves a decoy GET so
//! the stego-server presents a plausible public face.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, info, warn};

use stego_core::codec::{CoverPool, StegoCodec};
use stego_core::config::Config;
use stego_core::error::{CodecError, ProtocolError, ProxyError, TransportError};
use stego_core::headers::HeaderMap;
use stego_core::message::{build_request, build_response, encode_chunk, end_of_chunks, parse_request, split_chunks};

use crate::connection::{Connection, Role};
use crate::io::{read_covert_request, read_response};

#[derive(Clone)]
pub struct ServerHandler {
    config: Arc<Config>,
    codec: Arc<dyn StegoCodec>,
    covers: Arc<CoverPool>,
}

impl ServerHandler {
    pub fn new(config: Arc<Config>, codec: Arc<dyn StegoCodec>, covers: Arc<CoverPool>) -> Self {
        Self { config, codec, covers }
    }

    /// Handles one accepted stego-client connection, processing covert
    /// requests off it in a loop for as long as its own `Connection` header
    /// says keep-alive (the HTTP/1.1 default), per SPEC_FULL.md §4.6 step 8
    /// ("keep client connection alive per header"). Each request still
    /// dials and closes its own origin connection (step 8's "close origin
    /// connection" is unconditional and per-request).
    pub async fn handle(&self, client: tokio::net::TcpStream) {
        let mut client = Connection::new(Role::Client, client);
        let mut served_one = false;

        loop {
            match self.handle_one(&mut client).await {
                Ok(keep_alive) => {
                    served_one = true;
                    if !keep_alive {
                        break;
                    }
                }
                Err(ProxyError::Transport(TransportError::Closed)) if served_one => break,
                Err(e) => {
                    warn!(error = %e, "covert chain failed");
                    let encoded = BASE64.encode(b"Bad Gateway");
                    if let Ok(response) = self.wrap_response(encoded.as_bytes(), 502, "Bad Gateway") {
                        let _ = client.send_all(&response).await;
                    }
                    break;
                }
            }
        }

        client.close().await;
    }

    /// Handles one covert request/decoy GET and returns whether the
    /// stego-client connection should stay open for another.
    async fn handle_one(&self, client: &mut Connection) -> Result<bool, ProxyError> {
        let (head, media) = read_covert_request(client).await?;
        let keep_alive = !head
            .headers
            .get("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"));

        if head.method.eq_ignore_ascii_case("GET") && media.is_empty() {
            self.serve_decoy(client, &head.target).await?;
            return Ok(keep_alive);
        }

        info!("accepted covert request from stego-client");

        let mut recovered = Vec::new();
        for medium in &media {
            recovered.extend(self.codec.extract(medium)?);
        }
        let plaintext = BASE64.decode(&recovered).map_err(CodecError::from)?;
        let origin_request = parse_request(&plaintext).map_err(ProxyError::from)?;

        let (host, port) = origin_addr(&origin_request.headers)?;
        debug!(host = %host, port, "dialing origin");
        let mut origin = Connection::dial(Role::Server, &format!("{host}:{port}")).await?;
        origin.send_all(&plaintext).await?;

        let mut origin_response = read_response(&mut origin).await?;
        origin.close().await;
        origin_response.headers.strip_hop_by_hop();

        let response_bytes = build_response(
            &origin_response.version,
            origin_response.status,
            &origin_response.reason,
            &origin_response.headers,
            &origin_response.body,
        );
        let encoded = BASE64.encode(&response_bytes);

        let covert_response = self.wrap_response(encoded.as_bytes(), origin_response.status, &origin_response.reason)?;
        client.send_all(&covert_response).await?;
        debug!(bytes = covert_response.len(), "relayed covert response to stego-client");
        Ok(keep_alive)
    }

    /// A GET arriving without a covert body is proxied verbatim to the
    /// configured decoy host, giving the server a plausible public face.
    async fn serve_decoy(&self, client: &mut Connection, target: &str) -> Result<(), ProxyError> {
        let decoy_host = self
            .config
            .reverse_hostname
            .as_deref()
            .ok_or(ProtocolError::MissingHost)?;

        info!(decoy = %decoy_host, "serving decoy GET");
        let mut decoy = Connection::dial(Role::Server, &format!("{decoy_host}:80")).await?;

        let mut headers = HeaderMap::new();
        headers.append("Host", decoy_host);
        headers.append("Connection", "close");
        let request = build_request("GET", target, "HTTP/1.1", &headers, b"");
        decoy.send_all(&request).await?;

        let mut response = read_response(&mut decoy).await?;
        decoy.close().await;
        response.headers.strip_hop_by_hop();

        let bytes = build_response(
            &response.version,
            response.status,
            &response.reason,
            &response.headers,
            &response.body,
        );
        client.send_all(&bytes).await?;
        Ok(())
    }

    /// Wraps `base64_plaintext` (the base64 form of the real origin response
    /// bytes) as the stego-server's reply, carrying `status`/`reason` through
    /// to the client unchanged so it can surface them to the browser.
    fn wrap_response(&self, base64_plaintext: &[u8], status: u16, reason: &str) -> Result<Vec<u8>, ProxyError> {
        let remote_host = self.config.listen_addr.to_string();
        let cover_format = self.codec.cover_format();
        let cover = cover_format.and_then(|f| self.covers.pick(f, 0));
        let capacity = self.codec.capacity(cover).min(self.config.max_content_length.max(1));

        let mut headers = HeaderMap::new();
        headers.append("Host", &remote_host);
        headers.append("Connection", "keep-alive");

        if base64_plaintext.len() <= capacity {
            let medium = self.codec.embed(cover, base64_plaintext)?;
            headers.append("Content-Length", medium.bytes.len().to_string());
            return Ok(build_response("HTTP/1.1", status, reason, &headers, &medium.bytes));
        }

        headers.append("Transfer-Encoding", "chunked");
        let mut out = build_response("HTTP/1.1", status, reason, &headers, b"");
        for piece in split_chunks(base64_plaintext, self.config.max_content_length.max(1)) {
            let cover = cover_format.and_then(|f| self.covers.pick(f, 0));
            let medium = self.codec.embed(cover, piece)?;
            out.extend(encode_chunk(&medium.bytes));
        }
        out.extend_from_slice(end_of_chunks());
        Ok(out)
    }
}

/// Reads `Host` from the recovered plaintext request to determine the
/// origin address, defaulting to port 80 when unspecified.
fn origin_addr(headers: &HeaderMap) -> Result<(String, u16), ProxyError> {
    let host_header = headers.get("host").ok_or(ProtocolError::MissingHost)?;
    match host_header.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| ProtocolError::MissingHost)?;
            Ok((host.to_string(), port))
        }
        None => Ok((host_header.to_string(), 80)),
    }
}
