//! A buffered TCP connection shared between the client and server handlers.
//! Mirrors the original's `Connection`/`Server`/`Client` split: a socket plus
//! an outbound write queue so the CONNECT pump can interleave reads and
//! writes across both peers without blocking on a single direction.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use stego_core::error::TransportError;

/// Which side of a chain this connection represents; used only for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Client => "client",
            Self::Server => "server",
        })
    }
}

/// One side of a TCP link: a socket plus a pending write buffer and a closed
/// flag. A closed connection must never be read or written again.
pub struct Connection {
    role: Role,
    socket: TcpStream,
    buffer: Vec<u8>,
    closed: bool,
}

const RECV_CHUNK: usize = 8192;

impl Connection {
    pub fn new(role: Role, socket: TcpStream) -> Self {
        Self {
            role,
            socket,
            buffer: Vec::new(),
            closed: false,
        }
    }

    /// Dials `addr` and wraps the resulting socket. Dial failure is an
    /// ordinary `Result`, never hidden inside a constructor.
    pub async fn dial(role: Role, addr: &str) -> Result<Self, TransportError> {
        let socket = TcpStream::connect(addr).await?;
        Ok(Self::new(role, socket))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Writes `data` to the socket immediately, without buffering. Returns
    /// the number of bytes written; partial writes are permitted.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let n = self.socket.write(data).await?;
        Ok(n)
    }

    /// Writes `data` to the socket in full.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.socket.write_all(data).await?;
        Ok(())
    }

    /// Reads once, up to `RECV_CHUNK` bytes. An empty read means the peer
    /// closed its write half.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut buf = vec![0u8; RECV_CHUNK];
        let n = self.socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    /// Appends to the internal write buffer without touching the socket.
    pub fn write(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn has_buffer(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Writes as much of the buffer as the socket accepts and drops the sent
    /// prefix.
    pub async fn flush(&mut self) -> Result<usize, TransportError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let n = self.socket.write(&self.buffer).await?;
        self.buffer.drain(..n);
        Ok(n)
    }

    pub async fn close(&mut self) {
        let _ = self.socket.shutdown().await;
        self.closed = true;
    }

    /// Reads a complete HTTP message body given an already-known size, used
    /// once the caller has parsed a `Content-Length` header.
    pub async fn recv_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut out = vec![0u8; len];
        self.socket.read_exact(&mut out).await?;
        Ok(out)
    }
}
