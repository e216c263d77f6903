//! Outgoing response writer: headers, chunked body framing, and the
//! shared error-reply shortcut.

use std::time::Duration;

use crate::http::status::reason_phrase;
use crate::io::primitives::{write_full, writev_full};
use crate::io::ActiveFd;

const HEADER_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const CHUNK_SEND_TIMEOUT: Duration = Duration::from_millis(1);

pub struct Reply<'a> {
    socket: &'a ActiveFd,
    pub bytes_out: u64,
    headers_sent: bool,
}

impl<'a> Reply<'a> {
    pub fn new(socket: &'a ActiveFd) -> Self {
        Reply { socket, bytes_out: 0, headers_sent: false }
    }

    /// Composes and sends the status line and header block. Pass
    /// `content_length = None` to switch to chunked transfer encoding.
    pub async fn write_headers(
        &mut self,
        code: u16,
        content_length: Option<u64>,
        extra_headers: &[(&str, String)],
    ) -> std::io::Result<()> {
        let mut s = format!("HTTP/1.1 {} {}\r\nConnection: close\r\n", code, reason_phrase(code));
        match content_length {
            Some(n) => s.push_str(&format!("Content-Length: {}\r\n", n)),
            None => s.push_str("Transfer-Encoding: chunked\r\n"),
        }
        for (name, value) in extra_headers {
            s.push_str(name);
            s.push_str(": ");
            s.push_str(value);
            s.push_str("\r\n");
        }
        s.push_str("\r\n");

        let mut w = &self.socket.stream;
        write_full(&mut w, s.as_bytes(), HEADER_SEND_TIMEOUT).await?;
        self.bytes_out += s.len() as u64;
        self.headers_sent = true;
        Ok(())
    }

    /// Sends one chunk: `<hex-length>\r\n<data>\r\n`.
    pub async fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        let prefix = format!("{:x}\r\n", data.len());
        let mut w = &self.socket.stream;
        writev_full(&mut w, &[prefix.as_bytes(), data, b"\r\n"], CHUNK_SEND_TIMEOUT).await?;
        self.bytes_out += (prefix.len() + data.len() + 2) as u64;
        Ok(())
    }

    /// Sends the terminating zero-length chunk.
    pub async fn write_final_chunk(&mut self) -> std::io::Result<()> {
        let mut w = &self.socket.stream;
        write_full(&mut w, b"0\r\n\r\n", CHUNK_SEND_TIMEOUT).await?;
        self.bytes_out += 5;
        Ok(())
    }

    /// `write_headers(code, Some(0))` with no body, used for every
    /// error path.
    pub async fn write_error(&mut self, code: u16) -> std::io::Result<()> {
        self.write_headers(code, Some(0), &[]).await
    }
}
