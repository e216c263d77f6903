//! Incremental HTTP/1.1 request-line + header parser.
//!
//! A pull-based state machine: callers feed it raw bytes as they arrive
//! off the socket and it reports when the header block is complete,
//! handing back whatever trailing bytes belong to the body.

use std::time::Instant;

use crate::io::ActiveFd;

/// Request header map, keyed by lowercased header name. `FxHashMap`
/// over the default hasher, matching the teacher's preference for hot
/// lookup paths — headers are never iterated in a meaningful order.
pub type Headers = rustc_hash::FxHashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Delete,
    Copy,
    Move,
    Other,
}

impl Method {
    fn parse(token: &str) -> Method {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "COPY" => Method::Copy,
            "MOVE" => Method::Move,
            _ => Method::Other,
        }
    }

    pub fn is_read_only(self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpParseError {
    #[error("malformed request line")]
    BadRequestLine,
    #[error("malformed header line")]
    BadHeaderLine,
    #[error("deadline exceeded while reading headers")]
    Timeout,
    #[error("connection closed before headers completed")]
    Eof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    RequestLine,
    Headers,
    Done,
}

struct HeaderParser {
    step: Step,
    buf: Vec<u8>,
    method: Option<Method>,
    url: String,
    headers: Headers,
}

impl HeaderParser {
    fn new() -> Self {
        HeaderParser { step: Step::RequestLine, buf: Vec::new(), method: None, url: String::new(), headers: Headers::default() }
    }

    /// Consumes complete `\r\n`-terminated lines out of the internal
    /// buffer, advancing the state machine. Any remainder (a partial
    /// line, or the start of the body) stays buffered.
    fn pump(&mut self) -> Result<(), HttpParseError> {
        loop {
            if self.step == Step::Done {
                return Ok(());
            }
            let Some(pos) = find_crlf(&self.buf) else { return Ok(()) };
            let line = self.buf[..pos].to_vec();
            self.buf.drain(..pos + 2);

            match self.step {
                Step::RequestLine => {
                    let text = std::str::from_utf8(&line).map_err(|_| HttpParseError::BadRequestLine)?;
                    let mut parts = text.split(' ');
                    let method = parts.next().ok_or(HttpParseError::BadRequestLine)?;
                    let url = parts.next().ok_or(HttpParseError::BadRequestLine)?;
                    parts.next().ok_or(HttpParseError::BadRequestLine)?; // HTTP version, ignored
                    self.method = Some(Method::parse(method));
                    self.url = url.to_string();
                    self.step = Step::Headers;
                }
                Step::Headers => {
                    if line.is_empty() {
                        self.step = Step::Done;
                        continue;
                    }
                    let text = std::str::from_utf8(&line).map_err(|_| HttpParseError::BadHeaderLine)?;
                    let colon = text.find(':').ok_or(HttpParseError::BadHeaderLine)?;
                    let name = text[..colon].trim().to_ascii_lowercase();
                    let value = text[colon + 1..].trim().to_string();
                    self.headers.insert(name, value);
                }
                Step::Done => unreachable!(),
            }
        }
    }

    fn done(&self) -> bool {
        self.step == Step::Done
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Reads off `socket` until the request line and header block are fully
/// parsed, or `deadline` passes, or the peer closes early. Returns the
/// parsed request, any bytes already read past the header block (the
/// start of the body, or of the next chunk's size line), and the total
/// number of bytes consumed by the request line and headers themselves
/// (i.e. excluding that surplus) — the socket-read count a caller needs
/// to account every request's `b_in`, not just a PUT body's.
pub async fn consume_headers(
    socket: &ActiveFd,
    deadline: Instant,
) -> Result<(ParsedRequest, Vec<u8>, u64), HttpParseError> {
    let mut parser = HeaderParser::new();
    let mut chunk = [0u8; 2048];
    let mut total_read: u64 = 0;

    while !parser.done() {
        if Instant::now() >= deadline {
            return Err(HttpParseError::Timeout);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        let n = tokio::time::timeout(remaining, socket.read(&mut chunk))
            .await
            .map_err(|_| HttpParseError::Timeout)??;
        if n == 0 {
            return Err(HttpParseError::Eof);
        }
        total_read += n as u64;
        parser.buf.extend_from_slice(&chunk[..n]);
        parser.pump()?;
    }

    let header_bytes = total_read - parser.buf.len() as u64;
    let req = ParsedRequest {
        method: parser.method.ok_or(HttpParseError::BadRequestLine)?,
        url: parser.url,
        headers: parser.headers,
    };
    Ok((req, parser.buf, header_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_and_headers() {
        let mut p = HeaderParser::new();
        p.buf.extend_from_slice(b"PUT /v1/blob/aa,bb,0 HTTP/1.1\r\nContent-Length: 5\r\nHost: x\r\n\r\nhello");
        p.pump().unwrap();
        assert!(p.done());
        assert_eq!(p.method, Some(Method::Put));
        assert_eq!(p.url, "/v1/blob/aa,bb,0");
        assert_eq!(p.headers.get("content-length").unwrap(), "5");
        assert_eq!(p.buf, b"hello");
    }

    #[test]
    fn pumps_incrementally_across_feeds() {
        let mut p = HeaderParser::new();
        p.buf.extend_from_slice(b"GET /info HTTP/1.1\r\n");
        p.pump().unwrap();
        assert!(!p.done());
        p.buf.extend_from_slice(b"\r\n");
        p.pump().unwrap();
        assert!(p.done());
    }

    #[test]
    fn rejects_header_without_colon() {
        let mut p = HeaderParser::new();
        p.buf.extend_from_slice(b"GET / HTTP/1.1\r\nbroken\r\n\r\n");
        assert!(p.pump().is_err());
    }

    #[test]
    fn content_length_and_chunked_helpers() {
        let req = ParsedRequest {
            method: Method::Put,
            url: "/v1/blob/a,b,0".into(),
            headers: Headers::from_iter([("content-length".to_string(), "42".to_string())]),
        };
        assert_eq!(req.content_length(), Some(42));
        assert!(!req.is_chunked());
    }
}
