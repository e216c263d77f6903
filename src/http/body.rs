//! Request body transfer: a counted reader for `Content-Length` bodies
//! and a chunked reader that decodes `Transfer-Encoding: chunked`
//! framing while streaming into the destination file.

use std::time::Instant;

use crate::io::{ActiveFd, FileAppender};

fn timeout_err() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "body read deadline exceeded")
}

fn eof_err() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "peer closed mid-body")
}

fn framing_err() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed chunk framing")
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// A body whose exact length is known from `Content-Length`. Flushes
/// whatever was already read alongside the headers, then zero-copy
/// splices the rest straight from the socket into the file.
pub struct InlineBodyReader {
    total: u64,
    surplus: Vec<u8>,
}

impl InlineBodyReader {
    pub fn new(total: u64, surplus: Vec<u8>) -> Self {
        InlineBodyReader { total, surplus }
    }

    pub async fn write_to(
        &mut self,
        socket: &ActiveFd,
        appender: &mut FileAppender,
    ) -> std::io::Result<u64> {
        let from_surplus = (self.surplus.len() as u64).min(self.total);
        if from_surplus > 0 {
            appender.write_buf(&self.surplus[..from_surplus as usize])?;
        }
        let remaining = self.total - from_surplus;
        if remaining > 0 {
            appender.splice_from(&socket.stream, remaining as i64).await?;
        }
        Ok(self.total)
    }
}

/// A body framed with chunked transfer encoding. Decodes the
/// `<hex-length>\r\n<data>\r\n` framing until the zero-length
/// terminator, batching decoded bytes to the file every 8 MiB.
pub struct ChunkedBodyReader {
    buf: Vec<u8>,
    read_chunk: usize,
}

const MIN_READ_CHUNK: usize = 32 * 1024;
const MAX_READ_CHUNK: usize = 8 * 1024 * 1024;
const WRITE_BATCH: usize = 8 * 1024 * 1024;

impl ChunkedBodyReader {
    pub fn new(surplus: Vec<u8>) -> Self {
        ChunkedBodyReader { buf: surplus, read_chunk: MIN_READ_CHUNK }
    }

    async fn fill(&mut self, socket: &ActiveFd, deadline: Instant) -> std::io::Result<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timeout_err());
        }
        let mut tmp = vec![0u8; self.read_chunk];
        let n = tokio::time::timeout(remaining, socket.read(&mut tmp))
            .await
            .map_err(|_| timeout_err())??;
        if n == 0 {
            return Err(eof_err());
        }
        self.buf.extend_from_slice(&tmp[..n]);
        // Grows geometrically while the socket keeps returning full reads.
        if n == self.read_chunk && self.read_chunk < MAX_READ_CHUNK {
            self.read_chunk = (self.read_chunk * 2).min(MAX_READ_CHUNK);
        }
        Ok(())
    }

    async fn read_line(&mut self, socket: &ActiveFd, deadline: Instant) -> std::io::Result<Vec<u8>> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf[..pos].to_vec();
                self.buf.drain(..pos + 2);
                return Ok(line);
            }
            self.fill(socket, deadline).await?;
        }
    }

    async fn read_exact(&mut self, socket: &ActiveFd, n: usize, deadline: Instant) -> std::io::Result<Vec<u8>> {
        while self.buf.len() < n {
            self.fill(socket, deadline).await?;
        }
        let data = self.buf[..n].to_vec();
        self.buf.drain(..n);
        Ok(data)
    }

    pub async fn write_to(
        &mut self,
        socket: &ActiveFd,
        appender: &mut FileAppender,
        deadline: Instant,
    ) -> std::io::Result<u64> {
        let mut total = 0u64;
        let mut batch = Vec::with_capacity(WRITE_BATCH);

        loop {
            let size_line = self.read_line(socket, deadline).await?;
            let size_text = std::str::from_utf8(&size_line).map_err(|_| framing_err())?;
            let size_text = size_text.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_text, 16).map_err(|_| framing_err())?;

            if size == 0 {
                let trailer = self.read_line(socket, deadline).await?;
                if !trailer.is_empty() {
                    return Err(framing_err());
                }
                break;
            }

            let data = self.read_exact(socket, size, deadline).await?;
            let crlf = self.read_exact(socket, 2, deadline).await?;
            if crlf != b"\r\n" {
                return Err(framing_err());
            }

            total += data.len() as u64;
            batch.extend_from_slice(&data);
            if batch.len() >= WRITE_BATCH {
                appender.write_buf(&batch)?;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            appender.write_buf(&batch)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_chunk_size_parses() {
        assert_eq!(usize::from_str_radix("1a", 16).unwrap(), 26);
        assert_eq!(usize::from_str_radix("0", 16).unwrap(), 0);
    }

    #[test]
    fn crlf_finder_locates_boundary() {
        assert_eq!(find_crlf(b"abc\r\ndef"), Some(3));
        assert_eq!(find_crlf(b"abcdef"), None);
    }
}
