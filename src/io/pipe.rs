//! A non-blocking pipe used as the zero-copy staging area for
//! `splice(2)` transfers between a socket and a file.

use std::os::unix::io::RawFd;

/// Owns both ends of a `pipe2(O_NONBLOCK)` pair and closes them on drop.
pub struct Pipe {
    head: RawFd,
    tail: RawFd,
}

const DESIRED_PIPE_SIZE: libc::c_int = 8 * 1024 * 1024;

impl Pipe {
    /// Creates the pipe and tries to grow its buffer to 8 MiB so large
    /// transfers need fewer splice round-trips. A failure to resize is
    /// not fatal; the kernel default size is still usable.
    pub fn new() -> std::io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        // SAFETY: fds is a valid 2-element buffer for pipe2.
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let pipe = Pipe { head: fds[0], tail: fds[1] };
        // SAFETY: head is a valid, owned pipe read-end fd.
        unsafe {
            libc::fcntl(pipe.head, libc::F_SETPIPE_SZ, DESIRED_PIPE_SIZE);
        }
        Ok(pipe)
    }

    pub fn head(&self) -> RawFd {
        self.head
    }

    pub fn tail(&self) -> RawFd {
        self.tail
    }

    /// Current capacity of the pipe's kernel buffer, used to bound how
    /// much is loaded before it must be drained.
    pub fn capacity(&self) -> usize {
        // SAFETY: head is a valid pipe fd.
        let n = unsafe { libc::fcntl(self.head, libc::F_GETPIPE_SZ) };
        if n <= 0 {
            65536
        } else {
            n as usize
        }
    }

    /// Splices up to `n` bytes from `src` into the pipe's write end.
    /// Returns `Ok(0)` on EOF, `Err(EAGAIN)` when `src` has no data
    /// ready, and propagates any other error.
    pub fn splice_from(&self, src: RawFd, n: usize) -> std::io::Result<usize> {
        splice_raw(src, self.tail, n)
    }

    /// Splices up to `n` bytes out of the pipe's read end into `dst`.
    pub fn splice_to(&self, dst: RawFd, n: usize) -> std::io::Result<usize> {
        splice_raw(self.head, dst, n)
    }
}

fn splice_raw(from: RawFd, to: RawFd, n: usize) -> std::io::Result<usize> {
    // SAFETY: from/to are valid fds owned by the caller for the duration
    // of this call; null offsets mean "use and advance the file position".
    let r = unsafe {
        libc::splice(
            from,
            std::ptr::null_mut(),
            to,
            std::ptr::null_mut(),
            n,
            libc::SPLICE_F_NONBLOCK | libc::SPLICE_F_MOVE | libc::SPLICE_F_GIFT,
        )
    };
    if r < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(r as usize)
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        // SAFETY: fds are owned exclusively by this Pipe.
        unsafe {
            libc::close(self.head);
            libc::close(self.tail);
        }
    }
}
