//! A file opened for append-only writes, with pre-allocation and a
//! zero-copy splice path for ingesting an upload body straight from the
//! client socket.

use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use tokio::net::TcpStream;

use crate::io::pipe::Pipe;

/// How much to grow the file by each time the splice loop needs more
/// room ahead of the write cursor.
const PREALLOC_EXTENT: i64 = 64 * 1024 * 1024;

/// Bound on a single `readable()`/drain wait within one splice round.
/// A peer that stalls mid-upload past this is abandoned rather than
/// held open indefinitely.
const SPLICE_ROUND_TIMEOUT: Duration = Duration::from_secs(3);

fn splice_timeout_err() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "splice round deadline exceeded")
}

pub struct FileAppender {
    file: std::fs::File,
    written: i64,
    allocated: i64,
    extend_allowed: bool,
}

impl FileAppender {
    pub fn new(file: std::fs::File) -> Self {
        FileAppender { file, written: 0, allocated: 0, extend_allowed: true }
    }

    pub fn written(&self) -> i64 {
        self.written
    }

    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Extends the file by `size` bytes past the current write cursor
    /// without growing its reported length (`FALLOC_FL_KEEP_SIZE`).
    /// Disables itself for the rest of this appender's life the first
    /// time the filesystem reports `ENOTSUP`.
    pub fn preallocate(&mut self, size: i64) {
        if !self.extend_allowed {
            return;
        }
        // SAFETY: raw_fd is a valid, open file descriptor for the duration of this call.
        let rc = unsafe {
            libc::fallocate(self.raw_fd(), libc::FALLOC_FL_KEEP_SIZE, self.written, size)
        };
        if rc == 0 {
            self.allocated += size;
        } else if std::io::Error::last_os_error().raw_os_error() == Some(libc::ENOTSUP) {
            self.extend_allowed = false;
        }
    }

    /// Shrinks the file back to the actual write cursor if pre-allocation
    /// left it logically longer.
    pub fn truncate(&mut self) -> std::io::Result<()> {
        if self.written > self.allocated {
            return Ok(());
        }
        use std::io::Seek;
        self.file.set_len(self.written as u64)?;
        self.file.seek(std::io::SeekFrom::Start(self.written as u64))?;
        Ok(())
    }

    pub fn fdatasync(&self) -> std::io::Result<()> {
        self.file.sync_data()
    }

    /// Appends `buf` directly, for body bytes that arrived pre-parsed
    /// (chunk payloads, or the surplus read alongside the headers)
    /// rather than through the splice path.
    pub fn write_buf(&mut self, buf: &[u8]) -> std::io::Result<()> {
        use std::io::Write;
        self.file.write_all(buf)?;
        self.written += buf.len() as i64;
        Ok(())
    }

    pub fn into_inner(self) -> std::fs::File {
        self.file
    }

    pub fn file_ref(&self) -> &std::fs::File {
        &self.file
    }

    /// Zero-copy transfer of exactly `size` bytes from `src` into this
    /// file via an intermediate pipe: `splice(src -> pipe)` then
    /// `splice(pipe -> file)`. Loads up to a batch's worth from the
    /// socket before draining, so the pipe never blocks either side
    /// more than necessary.
    pub async fn splice_from(&mut self, src: &TcpStream, size: i64) -> std::io::Result<()> {
        if size <= 0 {
            return Ok(());
        }
        let target = size as u64;
        let pipe = Pipe::new()?;
        let batch = pipe.capacity();
        let mut accumulated: u64 = 0;
        // Bytes this call has moved into the file, independent of
        // whatever `self.written` already held on entry (e.g. from a
        // `write_buf` flush of the header-read surplus just before).
        let mut transferred: u64 = 0;

        loop {
            if accumulated == 0 && transferred >= target {
                break;
            }
            // load, at most 4 splices per round, until the pipe holds a batch
            let mut loaded_this_round = false;
            for _ in 0..4 {
                if accumulated >= batch as u64 {
                    break;
                }
                let want = (target - transferred - accumulated).min((batch as u64) - accumulated);
                if want == 0 {
                    break;
                }
                match pipe.splice_from(src.as_raw_fd(), want as usize) {
                    Ok(0) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "peer closed mid-upload",
                        ));
                    }
                    Ok(n) => {
                        accumulated += n as u64;
                        loaded_this_round = true;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        if accumulated > 0 {
                            break;
                        }
                        match tokio::time::timeout(SPLICE_ROUND_TIMEOUT, src.readable()).await {
                            Ok(r) => r?,
                            Err(_) => return Err(splice_timeout_err()),
                        }
                    }
                    Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                    Err(e) => return Err(e),
                }
            }

            if self.written as u64 + accumulated < self.allocated as u64 || self.allocated == 0 {
                self.preallocate(PREALLOC_EXTENT);
            }

            let round_deadline = std::time::Instant::now() + SPLICE_ROUND_TIMEOUT;
            while accumulated > 0 {
                match pipe.splice_to(self.raw_fd(), accumulated as usize) {
                    Ok(n) => {
                        self.written += n as i64;
                        transferred += n as u64;
                        accumulated -= n as u64;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        // regular files never report EAGAIN on splice-out in
                        // practice, but keep the retry for robustness.
                        if std::time::Instant::now() >= round_deadline {
                            return Err(splice_timeout_err());
                        }
                        tokio::task::yield_now().await;
                    }
                    Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                    Err(e) => return Err(e),
                }
            }

            if !loaded_this_round && transferred >= target {
                break;
            }
        }

        Ok(())
    }
}
