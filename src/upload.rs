//! PUT handler: exclusive-create temp file, zero-copy body ingestion,
//! atomic rename into place, rollback on any failure.

use std::time::Instant;

use crate::basedir::BaseDir;
use crate::config::Config;
use crate::error::UploadError;
use crate::http::body::{ChunkedBodyReader, InlineBodyReader};
use crate::io::FileAppender;
use crate::request::Request;

pub struct UploadOutcome {
    pub status: u16,
    pub bytes_in: u64,
}

/// Runs the whole PUT lifecycle against the mapped relative path
/// `final_path`. Never leaves a partial blob visible at `final_path`:
/// either it ends up complete, or nothing changed.
pub async fn handle_put(basedir: &BaseDir, config: &Config, req: &mut Request, final_path: &str) -> UploadOutcome {
    let temp_path = format!("{}@", final_path);

    let mut retried_mkdir = false;
    let file = loop {
        match basedir.create_excl(&temp_path) {
            Ok(f) => break f,
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) && !retried_mkdir => {
                retried_mkdir = true;
                if let Err(mkdir_err) = basedir.mkdir_parents(&temp_path) {
                    return failed(UploadError::Create(mkdir_err));
                }
                continue;
            }
            Err(e) => return failed(UploadError::Create(e)),
        }
    };

    match basedir.exists(final_path) {
        Ok(true) => {
            basedir.rollback(&temp_path);
            return UploadOutcome { status: 409, bytes_in: 0 };
        }
        Ok(false) => {}
        Err(e) => {
            basedir.rollback(&temp_path);
            return failed(UploadError::Create(e));
        }
    }

    let mut appender = FileAppender::new(file);
    let deadline = Instant::now() + std::time::Duration::from_secs(30);

    let transferred = if req.is_chunked() {
        let mut reader = ChunkedBodyReader::new(std::mem::take(&mut req.surplus));
        reader.write_to(&req.active, &mut appender, deadline).await
    } else {
        let total = req.content_length().unwrap_or(0);
        let mut reader = InlineBodyReader::new(total, std::mem::take(&mut req.surplus));
        reader.write_to(&req.active, &mut appender).await
    };

    let bytes_in = match transferred {
        Ok(n) => n,
        Err(e) => {
            basedir.rollback(&temp_path);
            return failed(UploadError::Transfer(e));
        }
    };

    if let Err(e) = appender.truncate() {
        basedir.rollback(&temp_path);
        return failed(UploadError::Commit(e));
    }

    if let Err(e) = basedir.rename(&temp_path, final_path) {
        basedir.rollback(&temp_path);
        return failed(UploadError::Commit(e));
    }

    if config.fsync_data {
        let _ = appender.fdatasync();
    } else if config.fsync_dir {
        let _ = basedir.fdatasync();
    }
    if config.fadvise_upload {
        advise_dontneed(&appender);
    }

    UploadOutcome { status: 201, bytes_in }
}

fn advise_dontneed(appender: &FileAppender) {
    use std::os::unix::io::AsRawFd;
    let file = appender.file_ref();
    // SAFETY: file is a valid, open file descriptor for the duration of this call.
    unsafe {
        libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED);
    }
}

fn failed(e: UploadError) -> UploadOutcome {
    UploadOutcome { status: e.http_status(), bytes_in: 0 }
}
