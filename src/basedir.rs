//! The held base-directory descriptor. Every blob file operation is
//! `*at`-relative to this fd so a rename of the directory itself can
//! never race an in-flight request.

use std::ffi::CString;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::Path;

pub struct BaseDir {
    fd: RawFd,
    root: std::path::PathBuf,
}

fn cpath(relative: &str) -> std::io::Result<CString> {
    CString::new(relative).map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains NUL"))
}

impl BaseDir {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let c = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains NUL"))?;
        // SAFETY: c is a valid NUL-terminated path.
        let fd = unsafe { libc::open(c.as_ptr(), libc::O_DIRECTORY | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(BaseDir { fd, root: path.to_path_buf() })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Absolute root used only by the lister's recursive directory
    /// walk, which needs `std::fs::read_dir` rather than a single
    /// `*at`-relative syscall per entry.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// `openat(relative, O_WRONLY|O_CREAT|O_EXCL|...)`: fails with
    /// `EEXIST` if a temp file from a previous attempt is still there.
    pub fn create_excl(&self, relative: &str) -> std::io::Result<std::fs::File> {
        let c = cpath(relative)?;
        let flags = libc::O_WRONLY
            | libc::O_CREAT
            | libc::O_EXCL
            | libc::O_CLOEXEC
            | libc::O_NONBLOCK
            | libc::O_NOATIME;
        // SAFETY: self.fd is a valid, open directory fd; c is NUL-terminated.
        let fd = unsafe { libc::openat(self.fd, c.as_ptr(), flags, 0o644) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        // SAFETY: fd was just returned by openat and is owned here.
        Ok(unsafe { std::fs::File::from_raw_fd(fd) })
    }

    /// `openat(relative, O_RDONLY|O_NOATIME)` for the download path.
    pub fn open_read(&self, relative: &str) -> std::io::Result<std::fs::File> {
        let c = cpath(relative)?;
        let flags = libc::O_RDONLY | libc::O_CLOEXEC | libc::O_NONBLOCK | libc::O_NOATIME;
        // SAFETY: self.fd is a valid, open directory fd; c is NUL-terminated.
        let fd = unsafe { libc::openat(self.fd, c.as_ptr(), flags) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        // SAFETY: fd was just returned by openat and is owned here.
        Ok(unsafe { std::fs::File::from_raw_fd(fd) })
    }

    pub fn exists(&self, relative: &str) -> std::io::Result<bool> {
        let c = cpath(relative)?;
        // SAFETY: self.fd is a valid, open directory fd; c is NUL-terminated.
        let rc = unsafe { libc::faccessat(self.fd, c.as_ptr(), libc::F_OK, 0) };
        if rc == 0 {
            Ok(true)
        } else {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }

    pub fn rename(&self, from: &str, to: &str) -> std::io::Result<()> {
        let cfrom = cpath(from)?;
        let cto = cpath(to)?;
        // SAFETY: self.fd valid; both paths NUL-terminated.
        let rc = unsafe { libc::renameat(self.fd, cfrom.as_ptr(), self.fd, cto.as_ptr()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn unlink(&self, relative: &str) -> std::io::Result<()> {
        let c = cpath(relative)?;
        // SAFETY: self.fd valid; c NUL-terminated.
        let rc = unsafe { libc::unlinkat(self.fd, c.as_ptr(), 0) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Removes the temp file left behind by an aborted upload. A
    /// missing file is not an error; anything else is swallowed too,
    /// since rollback failures are logged, never surfaced to the client.
    pub fn rollback(&self, temp_relative: &str) {
        if let Err(e) = self.unlink(temp_relative) {
            if e.raw_os_error() != Some(libc::ENOENT) {
                tracing::warn!(path = temp_relative, error = %e, "rollback unlink failed");
            }
        }
    }

    /// Creates every missing directory component of `relative`'s parent
    /// chain, mode 0755.
    pub fn mkdir_parents(&self, relative: &str) -> std::io::Result<()> {
        let Some(parent) = relative.rfind('/').map(|i| &relative[..i]) else { return Ok(()) };
        let mut prefix = String::new();
        for component in parent.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            let c = cpath(&prefix)?;
            // SAFETY: self.fd valid; c NUL-terminated.
            let rc = unsafe { libc::mkdirat(self.fd, c.as_ptr(), 0o755) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EEXIST) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    pub fn fdatasync(&self) -> std::io::Result<()> {
        // SAFETY: self.fd is a valid, open directory fd.
        let rc = unsafe { libc::fsync(self.fd) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for BaseDir {
    fn drop(&mut self) {
        // SAFETY: fd is owned exclusively by this BaseDir.
        unsafe {
            libc::close(self.fd);
        }
    }
}

unsafe impl Send for BaseDir {}
unsafe impl Sync for BaseDir {}
