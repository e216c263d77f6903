//! errno -> HTTP status mapping and the error enums used by the
//! upload/download/list engines.

use thiserror::Error;

/// Maps a raw `errno` value to the HTTP status code a handler replies
/// with. EISDIR maps to 502 rather than a client error; callers should
/// treat that as a signal of a misconfigured base directory rather than
/// bad input.
pub fn errno_to_http(errno: i32) -> u16 {
    match errno {
        libc::EINVAL => 400,
        libc::ENOENT | libc::ENOTDIR => 404,
        libc::EISDIR => 502,
        libc::EBUSY => 503,
        libc::EPERM | libc::EACCES | libc::EROFS => 403,
        libc::EEXIST => 409,
        _ => 500,
    }
}

#[derive(Debug, Error)]
pub enum BlobIdError {
    #[error("malformed blob id: fewer than two commas")]
    MissingSeparator,
    #[error("malformed blob id: empty position token")]
    EmptyPosition,
    #[error("malformed blob id: non-hex digit in content or part")]
    NotHex,
}

impl BlobIdError {
    pub fn http_status(&self) -> u16 {
        400
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("temp file create failed: {0}")]
    Create(#[source] std::io::Error),
    #[error("blob already exists")]
    AlreadyExists,
    #[error("body transfer failed: {0}")]
    Transfer(#[source] std::io::Error),
    #[error("commit failed: {0}")]
    Commit(#[source] std::io::Error),
}

impl UploadError {
    pub fn http_status(&self) -> u16 {
        match self {
            UploadError::Create(e) => errno_to_http(e.raw_os_error().unwrap_or(0)),
            UploadError::AlreadyExists => 409,
            UploadError::Transfer(e) => errno_to_http(e.raw_os_error().unwrap_or(0)),
            UploadError::Commit(e) => errno_to_http(e.raw_os_error().unwrap_or(0)),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("open failed: {0}")]
    Open(#[source] std::io::Error),
    #[error("stat failed: {0}")]
    Stat(#[source] std::io::Error),
    #[error("transfer failed: {0}")]
    Transfer(#[source] std::io::Error),
}

impl DownloadError {
    pub fn http_status(&self) -> u16 {
        match self {
            DownloadError::Open(e) => errno_to_http(e.raw_os_error().unwrap_or(0)),
            DownloadError::Stat(e) => errno_to_http(e.raw_os_error().unwrap_or(0)),
            DownloadError::Transfer(e) => errno_to_http(e.raw_os_error().unwrap_or(0)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("directory read failed: {0}")]
    ReadDir(#[source] std::io::Error),
    #[error("base directory open failed: {0}")]
    Open(#[from] std::io::Error),
}
