use std::fs::Permissions;
use std::io::{Error, ErrorKind};
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// control messages are tiny, anything larger is not from clock-ctl
const MAX_MESSAGE_SIZE: u64 = 1 << 20;

/// Write `value` as JSON, prefixed by its length as a big-endian u64.
pub async fn write_json<T>(stream: &mut (impl AsyncWrite + Unpin), value: &T) -> std::io::Result<()>
where
    T: serde::Serialize,
{
    let bytes = serde_json::to_vec(value).map_err(|e| Error::new(ErrorKind::InvalidData, e))?;
    stream.write_u64(bytes.len() as u64).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await
}

/// Read one message written by [`write_json`]. `buffer` is reused between
/// calls and grows as needed.
pub async fn read_json<'a, T>(
    stream: &mut (impl AsyncRead + Unpin),
    buffer: &'a mut Vec<u8>,
) -> std::io::Result<T>
where
    T: serde::Deserialize<'a>,
{
    let size = stream.read_u64().await?;
    if size > MAX_MESSAGE_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("message of {size} bytes exceeds the limit of {MAX_MESSAGE_SIZE}"),
        ));
    }

    buffer.clear();
    buffer.resize(size as usize, 0);
    stream.read_exact(buffer).await?;
    serde_json::from_slice(buffer).map_err(|e| Error::new(ErrorKind::InvalidInput, e))
}

/// Bind a unix listener at `path`, replacing a stale socket left behind by an
/// earlier run, and apply `permissions` to the socket file.
pub fn create_unix_socket_with_permissions(
    path: &Path,
    permissions: Permissions,
) -> std::io::Result<tokio::net::UnixListener> {
    let listener = create_unix_socket(path)?;
    std::fs::set_permissions(path, permissions)?;
    Ok(listener)
}

fn create_unix_socket(path: &Path) -> std::io::Result<tokio::net::UnixListener> {
    // bind fails with "address already in use" on a leftover socket
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        use std::os::unix::fs::FileTypeExt;

        if !meta.file_type().is_socket() {
            return Err(Error::other(format!(
                "{} exists but is not a socket",
                path.display()
            )));
        }
        std::fs::remove_file(path)?;
    }

    match tokio::net::UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(_) if path.parent().is_some_and(|parent| !parent.exists()) => {
            Err(Error::other(format!(
                "could not create control socket at {}: its parent directory does not exist",
                path.display()
            )))
        }
        Err(e) => Err(Error::other(format!(
            "could not create control socket at {}: {e}",
            path.display()
        ))),
    }
}
