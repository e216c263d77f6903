//! The per-connection request/reply pair handed between the acceptor
//! and an executor thread.

use std::time::Instant;

use tracing::Span;

use crate::http::{Headers, Method};
use crate::io::ActiveFd;

/// A fully header-parsed request, still owning its socket and any
/// bytes read past the header block. Single owner end-to-end: created
/// on accept, consumed by the handler that writes the reply.
pub struct Request {
    pub active: ActiveFd,
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub surplus: Vec<u8>,
    /// Bytes read off the socket for this request so far: the request
    /// line and header block. Handlers that read a body (PUT) add to
    /// this rather than replace it.
    pub bytes_in: u64,

    pub t_active: Instant,
    pub t_parsed: Instant,

    pub span_active: Span,
    pub span_parse: Span,
    /// Covers handler dispatch; the handler is responsible for letting
    /// both this and `span_active` finish once the reply is written.
    pub span_exec: Span,
}

impl Request {
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.headers
            .get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }
}

/// A request that has cleared header parsing on the acceptor thread
/// and is crossing over to an executor thread. The socket travels as a
/// plain `std::net::TcpStream`, detached from the acceptor's reactor;
/// the executor re-attaches it to its own runtime on arrival.
pub struct Handoff {
    pub std_stream: std::net::TcpStream,
    pub peer: std::net::SocketAddr,
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub surplus: Vec<u8>,
    pub header_bytes: u64,
    pub t_active: Instant,
    pub t_parsed: Instant,
    pub span_active: Span,
    pub span_parse: Span,
    /// Open from the moment this handoff is queued until an executor
    /// thread picks it up; dropped (finishing it) by `into_request`.
    pub span_wait: Span,
}

impl Handoff {
    /// Re-attaches the socket to the calling thread's tokio runtime and
    /// rebuilds the full `Request`. Must run inside that runtime. Consumes
    /// `self`, which finishes `span_wait` — the request is no longer
    /// queued once this returns. `span_exec` is supplied by the caller,
    /// which has already derived it from `span_active`/`span_wait`.
    pub fn into_request(self, span_exec: Span) -> std::io::Result<Request> {
        self.std_stream.set_nonblocking(true)?;
        let stream = tokio::net::TcpStream::from_std(self.std_stream)?;
        let active = ActiveFd::new(stream, self.peer);
        Ok(Request {
            active,
            method: self.method,
            url: self.url,
            headers: self.headers,
            surplus: self.surplus,
            bytes_in: self.header_bytes,
            t_active: self.t_active,
            t_parsed: self.t_parsed,
            span_active: self.span_active,
            span_parse: self.span_parse,
            span_exec,
        })
    }
}
