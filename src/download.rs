//! GET/HEAD handler: open, stat, and stream the blob file to the
//! socket via `sendfile(2)`.

use crate::basedir::BaseDir;
use crate::error::{errno_to_http, DownloadError};
use crate::http::Reply;
use crate::io::ActiveFd;

pub struct DownloadOutcome {
    pub status: u16,
    pub bytes_out: u64,
}

/// `with_body = false` for HEAD: headers only, no sendfile loop.
pub async fn handle_get(
    basedir: &BaseDir,
    active: &ActiveFd,
    final_path: &str,
    with_body: bool,
    reply: &mut Reply<'_>,
) -> DownloadOutcome {
    let file = match basedir.open_read(final_path) {
        Ok(f) => f,
        Err(e) => {
            let status = errno_to_http(e.raw_os_error().unwrap_or(0));
            let _ = reply.write_error(status).await;
            return DownloadOutcome { status, bytes_out: reply.bytes_out };
        }
    };

    let size = match file.metadata() {
        Ok(m) => m.len(),
        Err(e) => {
            let status = errno_to_http(e.raw_os_error().unwrap_or(0));
            let _ = reply.write_error(status).await;
            return DownloadOutcome { status, bytes_out: reply.bytes_out };
        }
    };

    let status = if size > 0 { 200 } else { 204 };
    if let Err(e) = reply.write_headers(status, Some(size), &[]).await {
        tracing::debug!(error = %e, "failed to send response headers");
        return DownloadOutcome { status: 499, bytes_out: reply.bytes_out };
    }

    if !with_body || size == 0 {
        return DownloadOutcome { status, bytes_out: reply.bytes_out };
    }

    match active.sendfile(&file, size as i64).await {
        Ok(()) => {
            reply.bytes_out += size;
            DownloadOutcome { status, bytes_out: reply.bytes_out }
        }
        Err(e) => {
            tracing::debug!(error = %e, "sendfile transfer failed, abandoning connection");
            let _ = DownloadError::Transfer(e);
            DownloadOutcome { status: 499, bytes_out: reply.bytes_out }
        }
    }
}

/// DELETE: `unlinkat(final, 0)`.
pub fn handle_delete(basedir: &BaseDir, final_path: &str) -> u16 {
    match basedir.unlink(final_path) {
        Ok(()) => 204,
        Err(e) => errno_to_http(e.raw_os_error().unwrap_or(0)),
    }
}
