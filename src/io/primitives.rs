//! Deadline-bounded write loops shared by the socket and file wrappers.
//! Each loop keeps going through short writes and stops only once the
//! whole buffer moved or one single attempt stalls past its timeout —
//! a "soft" deadline, since forward progress keeps renewing it.

use std::time::Duration;

use tokio::io::AsyncWriteExt;

/// Writes the whole buffer, retrying short writes. `timeout` bounds each
/// individual `write()` attempt, not the call as a whole: as long as
/// some progress lands before each window expires, the transfer keeps
/// going (cooperative retry on `WouldBlock`/slow peers).
pub async fn write_full<W>(writer: &mut W, buf: &[u8], timeout: Duration) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut total = 0usize;
    while total < buf.len() {
        let n = tokio::time::timeout(timeout, writer.write(&buf[total..]))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write deadline exceeded"))??;
        total += n;
    }
    Ok(())
}

/// Writes every slice in `bufs` in order, applying `timeout` to each
/// underlying attempt the same way `write_full` does.
pub async fn writev_full<W>(writer: &mut W, bufs: &[&[u8]], timeout: Duration) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    for b in bufs {
        write_full(writer, b, timeout).await?;
    }
    Ok(())
}
