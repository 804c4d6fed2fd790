//! Browser-facing state machine: accepts a plaintext HTTP request from the
//! browser, wraps it in a covert medium, round-trips it through the
//! stego-server, and relays the recovered response back unmodified.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, info, warn};

use stego_core::codec::{CoverPool, StegoCodec};
use stego_core::config::Config;
use stego_core::error::{CodecError, ProtocolError, ProxyError, TransportError};
use stego_core::headers::HeaderMap;
use stego_core::message::{build_request, build_response, encode_chunk, end_of_chunks, split_chunks};

use crate::connection::{Connection, Role};
use crate::handler::{bad_gateway, pump_connect};
use crate::io::{read_covert_response, read_request};

#[derive(Clone)]
pub struct ClientHandler {
    config: Arc<Config>,
    codec: Arc<dyn StegoCodec>,
    covers: Arc<CoverPool>,
}

impl ClientHandler {
    pub fn new(config: Arc<Config>, codec: Arc<dyn StegoCodec>, covers: Arc<CoverPool>) -> Self {
        Self { config, codec, covers }
    }

    /// Handles one accepted browser connection, processing requests off it
    /// in a loop for as long as keep-alive applies (the HTTP/1.1 default,
    /// per SPEC_FULL.md §4.5 step 2). The dialed stego-server connection is
    /// reused across iterations of the loop rather than redialed per
    /// request.
    pub async fn handle(&self, browser: tokio::net::TcpStream) {
        let mut browser = Connection::new(Role::Client, browser);
        let mut server: Option<Connection> = None;
        let mut served_one = false;

        loop {
            let request = match read_request(&mut browser).await {
                Ok(req) => req,
                Err(ProxyError::Transport(TransportError::Closed)) if served_one => break,
                Err(e) => {
                    warn!(error = %e, "failed to parse browser request");
                    let _ = browser.send_all(&bad_gateway("malformed browser request")).await;
                    break;
                }
            };

            info!(method = %request.method, target = %request.target, "accepted browser request");

            if request.method.eq_ignore_ascii_case("CONNECT") {
                self.handle_connect(&mut browser, &request.target).await;
                return;
            }

            let keep_alive = !request
                .headers
                .get("connection")
                .is_some_and(|v| v.eq_ignore_ascii_case("close"));
            served_one = true;

            if let Err(e) = self.handle_command(&mut browser, &mut server, request).await {
                warn!(error = %e, "chain failed, returning 502 to browser");
                let _ = browser.send_all(&bad_gateway(&e.to_string())).await;
                break;
            }

            if !keep_alive {
                break;
            }
        }

        browser.close().await;
        if let Some(mut server) = server {
            server.close().await;
        }
    }

    async fn handle_connect(&self, browser: &mut Connection, target: &str) {
        let Some((host, port)) = target.rsplit_once(':') else {
            let _ = browser.send_all(&bad_gateway("malformed CONNECT target")).await;
            browser.close().await;
            return;
        };

        let addr = format!("{host}:{port}");
        let mut origin = match Connection::dial(Role::Server, &addr).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, target = %addr, "CONNECT dial failed");
                let _ = browser.send_all(&bad_gateway("could not reach CONNECT target")).await;
                browser.close().await;
                return;
            }
        };

        let established = build_response("HTTP/1.1", 200, "Connection Established", &HeaderMap::new(), b"");
        if browser.send_all(&established).await.is_err() {
            return;
        }

        info!(target = %addr, "CONNECT tunnel established");
        pump_connect(browser, &mut origin).await;
    }

    /// Non-CONNECT methods: wrap the request, round-trip it through the
    /// stego-server, and relay the recovered response. `server` is dialed
    /// once and reused across calls from the same browser connection's
    /// keep-alive loop in [`Self::handle`].
    async fn handle_command(
        &self,
        browser: &mut Connection,
        server: &mut Option<Connection>,
        request: stego_core::message::HttpRequest,
    ) -> Result<(), ProxyError> {
        let remote_addr = self
            .config
            .remote_addr
            .ok_or(ProtocolError::MissingHost)?;

        if server.is_none() {
            *server = Some(Connection::dial(Role::Server, &remote_addr.to_string()).await?);
        }
        let server = server.as_mut().expect("just populated above");

        let plaintext = build_request(
            &request.method,
            &request.target,
            &request.version,
            &request.headers,
            &request.body,
        );
        let encoded = BASE64.encode(&plaintext);

        let covert_request = self.wrap_plaintext(encoded.as_bytes(), remote_addr.to_string().as_str())?;
        server.send_all(&covert_request).await?;
        debug!(bytes = covert_request.len(), "sent covert request to stego-server");

        let (_head, media) = read_covert_response(server).await?;

        let mut recovered = Vec::new();
        for medium in &media {
            recovered.extend(self.codec.extract(medium)?);
        }
        let decoded = BASE64.decode(&recovered).map_err(CodecError::from)?;

        debug!(bytes = decoded.len(), "relaying recovered response to browser");
        browser.send_all(&decoded).await?;
        Ok(())
    }

    fn wrap_plaintext(&self, base64_plaintext: &[u8], remote_host: &str) -> Result<Vec<u8>, ProxyError> {
        let cover_format = self.codec.cover_format();
        let cover = cover_format.and_then(|f| self.covers.pick(f, 0));
        let capacity = self.codec.capacity(cover);

        if base64_plaintext.len() <= capacity {
            let medium = self.codec.embed(cover, base64_plaintext)?;
            return Ok(stego_core::message::build_stego_request(remote_host, &medium.bytes, false));
        }

        let max_chunk = self.config.max_content_length.min(capacity.max(1));
        let mut headers = HeaderMap::new();
        headers.append("Host", remote_host);
        headers.append("Connection", "keep-alive");
        headers.append("Transfer-Encoding", "chunked");
        let mut out = build_request("POST", "/", "HTTP/1.1", &headers, b"");

        for piece in split_chunks(base64_plaintext, max_chunk) {
            let cover = cover_format.and_then(|f| self.covers.pick(f, 0));
            let medium = self.codec.embed(cover, piece)?;
            out.extend(encode_chunk(&medium.bytes));
        }
        out.extend_from_slice(end_of_chunks());
        Ok(out)
    }
}
