use std::{io, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::mpsc::{self, UnboundedSender},
};
use tracing::{debug, info};

use crate::{
    directory::{SessionDirectory, SessionHandle},
    registry::{FileRegistry, human_size},
    router::BroadcastRouter,
};

const LINE_ENDINGS: &[char] = &['\n', '\r'];
const LIST_FOOTER: &str = "========================";

/// Drives one chat connection from accept to close.
///
/// The display name is whatever the first line says, taken verbatim with no
/// validation; duplicates are allowed. A peer that disconnects before naming
/// itself leaves no trace: no directory entry, no departure notice.
pub async fn handle_session(
    stream: TcpStream,
    directory: Arc<SessionDirectory>,
    registry: Arc<FileRegistry>,
    router: Arc<BroadcastRouter>,
) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Everything destined for this client flows through one queue drained by
    // a dedicated writer task, so a stalled peer only ever blocks itself.
    let (outbound, inbox) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(run_writer(writer, inbox));

    let _ = outbound.send("Enter your username:".to_string());
    let name = match read_line(&mut reader).await? {
        Some(line) => line,
        None => {
            drop(outbound);
            let _ = writer_task.await;
            return Ok(());
        }
    };

    let session = directory.add(name.clone(), outbound.clone());
    info!(?peer, username = %name, "session registered");

    send_user_list(&directory, &outbound);
    router.broadcast_except(&format!("{name} joined the chat!"), Some(session.id));

    let loop_result = command_loop(&mut reader, &session, &directory, &registry, &router).await;

    // Deregistration and the departure notice run on every exit path,
    // including read errors on this session's own connection.
    let _ = directory.remove(session.id);
    router.broadcast_except(&format!("{name} left the chat!"), None);
    info!(?peer, username = %name, "session closed");

    drop(session);
    drop(outbound);
    let _ = writer_task.await;

    loop_result
}

async fn run_writer<W>(mut writer: W, mut inbox: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = inbox.recv().await {
        if let Err(err) = write_line(&mut writer, &line).await {
            debug!(?err, "stopping writer after failed delivery");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Reads lines and dispatches commands until `exit`, end of stream, or a
/// read error.
async fn command_loop<R>(
    reader: &mut R,
    session: &SessionHandle,
    directory: &SessionDirectory,
    registry: &FileRegistry,
    router: &BroadcastRouter,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = read_line(reader).await? {
        if line.eq_ignore_ascii_case("exit") {
            break;
        } else if let Some(rest) = line.strip_prefix('@') {
            // "@name text"; a line missing either part is dropped silently.
            if let Some((recipient, text)) = rest.split_once(' ') {
                router.send_private(recipient, text, session);
            }
        } else if line.eq_ignore_ascii_case("!users") {
            send_user_list(directory, &session.outbound);
        } else if line.eq_ignore_ascii_case("!files") {
            send_file_list(registry, &session.outbound);
        } else if let Some(args) = line.strip_prefix("!share ") {
            handle_share(args, session, registry, router);
        } else if let Some(file_id) = line.strip_prefix("!download ") {
            handle_download_request(file_id, session, registry);
        } else if !line.is_empty() {
            router.broadcast_except(&format!("{}: {line}", session.name), Some(session.id));
        }
    }
    Ok(())
}

/// Records an announced share and tells the whole room, sharer included.
fn handle_share(
    args: &str,
    session: &SessionHandle,
    registry: &FileRegistry,
    router: &BroadcastRouter,
) {
    let Some((filename, size)) = args.rsplit_once(' ') else {
        let _ = session
            .outbound
            .send("ERROR:Usage: !share <filename> <size>".to_string());
        return;
    };
    let filename = filename.trim();
    if filename.is_empty() {
        let _ = session
            .outbound
            .send("ERROR:Usage: !share <filename> <size>".to_string());
        return;
    }
    let Ok(size_bytes) = size.parse::<u64>() else {
        let _ = session.outbound.send("ERROR:Invalid file size".to_string());
        return;
    };

    let file_id = registry.announce(filename.to_string(), size_bytes, session.name.clone());
    router.broadcast_except(
        &format!(
            "[FILE] {} shared: {filename} ({}) - ID: {file_id}",
            session.name,
            human_size(size_bytes)
        ),
        None,
    );
}

/// Answers a download request; the actual bytes move on the file channel.
fn handle_download_request(file_id: &str, session: &SessionHandle, registry: &FileRegistry) {
    match registry.lookup(file_id) {
        Some(record) => {
            let _ = session.outbound.send(format!(
                "DOWNLOAD_READY:{file_id}:{}:{}",
                record.filename, record.size_bytes
            ));
        }
        None => {
            let _ = session.outbound.send("ERROR:File not found".to_string());
        }
    }
}

fn send_user_list(directory: &SessionDirectory, outbound: &UnboundedSender<String>) {
    let sessions = directory.snapshot();
    let _ = outbound.send(format!("=== Online Users ({}) ===", sessions.len()));
    for session in &sessions {
        let _ = outbound.send(format!("- {}", session.name));
    }
    let _ = outbound.send(LIST_FOOTER.to_string());
}

fn send_file_list(registry: &FileRegistry, outbound: &UnboundedSender<String>) {
    let files = registry.list_all();
    let _ = outbound.send(format!("=== Shared Files ({}) ===", files.len()));
    for (id, record) in &files {
        let _ = outbound.send(format!(
            "ID: {id} | {} ({}) from {}",
            record.filename,
            human_size(record.size_bytes),
            record.uploader
        ));
    }
    let _ = outbound.send("Use !download <fileId> to download".to_string());
    let _ = outbound.send(LIST_FOOTER.to_string());
}

async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).await?;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
