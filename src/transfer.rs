use std::{io, path::Path, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{info, warn};

use crate::registry::FileRegistry;

/// Frames are one u16 big-endian byte length followed by that many UTF-8
/// bytes, the framing the file channel has always spoken.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

const COPY_CHUNK: usize = 8 * 1024;

/// Reads one length-prefixed string. Returns `None` on a clean end of
/// stream before the length header.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// Writes one length-prefixed string and flushes it.
pub async fn write_frame<W>(writer: &mut W, value: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = value.as_bytes();
    if bytes.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "frame exceeds u16 length prefix",
        ));
    }
    writer.write_all(&(bytes.len() as u16).to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Runs the upload sub-protocol for one file-channel connection.
///
/// The peer names an announced file id, receives a READY frame, confirms
/// with START, then streams exactly the announced byte count. A connection
/// dropped mid-stream leaves a truncated file behind with no cleanup and no
/// SUCCESS frame.
pub async fn handle_transfer(
    mut stream: TcpStream,
    registry: Arc<FileRegistry>,
    storage_dir: &Path,
) -> Result<()> {
    let file_id = match read_frame(&mut stream).await? {
        Some(id) => id,
        None => return Ok(()),
    };

    let record = match registry.lookup(&file_id) {
        Some(record) => record,
        None => {
            warn!(%file_id, "transfer requested for unknown file id");
            write_frame(&mut stream, "ERROR:File not found").await?;
            return Ok(());
        }
    };

    write_frame(
        &mut stream,
        &format!("READY:{}:{}", record.filename, record.size_bytes),
    )
    .await?;

    match read_frame(&mut stream).await? {
        Some(frame) if frame == "START" => {}
        other => {
            warn!(%file_id, ?other, "expected START frame, closing");
            return Ok(());
        }
    }

    fs::create_dir_all(storage_dir)
        .await
        .with_context(|| format!("failed to create storage dir {}", storage_dir.display()))?;
    let stored_name = stored_file_name(&file_id, &record.filename);
    let path = storage_dir.join(&stored_name);
    let received = receive_bytes(&mut stream, &path, record.size_bytes).await?;

    if received < record.size_bytes {
        warn!(
            %file_id,
            received,
            expected = record.size_bytes,
            "upload ended before the announced size"
        );
        return Ok(());
    }

    write_frame(&mut stream, &format!("SUCCESS:File saved as {stored_name}")).await?;
    info!(%file_id, file = %path.display(), bytes = received, "file stored");
    Ok(())
}

/// On-disk name for a received upload: `<fileId>_<name>`.
///
/// Only the final path component of the announced filename is used, so an
/// announced name cannot steer the write outside the storage directory.
fn stored_file_name(file_id: &str, filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    format!("{file_id}_{base}")
}

/// Copies up to `expected` bytes from the stream into a fresh file at
/// `path`, in bounded chunks. Returns the byte count written; a short count
/// means the stream ended early.
async fn receive_bytes<R>(reader: &mut R, path: &Path, expected: u64) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut buffer = [0u8; COPY_CHUNK];
    let mut remaining = expected;
    while remaining > 0 {
        let want = remaining.min(COPY_CHUNK as u64) as usize;
        let read = reader.read(&mut buffer[..want]).await?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).await?;
        remaining -= read as u64;
    }
    file.flush().await?;
    Ok(expected - remaining)
}
