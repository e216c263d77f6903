//! The accepted connection socket: priority tagging and the zero-copy
//! `sendfile(2)` download path.

use std::os::unix::io::AsRawFd;
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;

/// Bound on each `writable()` wait inside the `sendfile` loop. A peer
/// that stops reading past this is abandoned rather than held open.
const SENDFILE_WAIT_TIMEOUT: Duration = Duration::from_millis(10);

/// Linux `IPTOS_*`/`SO_PRIORITY` classes used to steer a connection's
/// packets once it has been classified as best-effort or real-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpTos {
    Default = 0,
    LowCost = 1,
    Reliability = 2,
    Throughput = 3,
    LowDelay = 4,
}

/// The accepted socket plus its peer address, handed off between the
/// acceptor and an executor thread.
pub struct ActiveFd {
    pub stream: TcpStream,
    pub peer: std::net::SocketAddr,
}

impl ActiveFd {
    pub fn new(stream: TcpStream, peer: std::net::SocketAddr) -> Self {
        ActiveFd { stream, peer }
    }

    /// Tags outgoing packets on this connection with `SO_PRIORITY`.
    /// Best-effort connections get `LowCost`, real-time ones `Throughput`.
    /// A failure here just leaves the connection at the default priority.
    pub fn set_prio(&self, tos: IpTos) {
        let sock = SockRef::from(&self.stream);
        if let Err(e) = sock.set_priority(tos as i32) {
            tracing::debug!(peer = %self.peer, error = %e, "failed to set SO_PRIORITY, continuing at default");
        }
    }

    /// Zero-copy transfer of `size` bytes from `file` (starting at its
    /// current position) to this socket, retrying on short sends and
    /// waiting for writability on `EAGAIN`.
    pub async fn sendfile(&self, file: &std::fs::File, size: i64) -> std::io::Result<()> {
        use std::os::unix::io::AsRawFd as _;
        let mut sent: i64 = 0;
        let in_fd = file.as_raw_fd();
        loop {
            if sent >= size {
                return Ok(());
            }
            let remaining = (size - sent) as usize;
            // SAFETY: in_fd is a valid open file, self.stream's fd a valid
            // connected socket; offset is null so the kernel advances the
            // file's own position (matching the caller's sequential use).
            let rc = unsafe {
                libc::sendfile(
                    self.stream.as_raw_fd(),
                    in_fd,
                    std::ptr::null_mut(),
                    remaining,
                )
            };
            if rc >= 0 {
                sent += rc as i64;
                if rc == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "sendfile returned 0 before size reached",
                    ));
                }
                continue;
            }
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => {
                    match tokio::time::timeout(SENDFILE_WAIT_TIMEOUT, self.stream.writable()).await {
                        Ok(r) => r?,
                        Err(_) => {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "sendfile writable wait deadline exceeded",
                            ))
                        }
                    }
                    continue;
                }
                _ => return Err(err),
            }
        }
    }

    /// Reads up to `buf.len()` bytes, retrying `EINTR`/`EAGAIN` with a
    /// readiness wait rather than a busy loop.
    pub async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            match self.stream.try_read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.stream.readable().await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Detaches the socket from this thread's reactor so it can be
    /// handed to another thread's runtime and re-attached there.
    pub fn into_std(self) -> std::io::Result<(std::net::TcpStream, std::net::SocketAddr)> {
        Ok((self.stream.into_std()?, self.peer))
    }
}
