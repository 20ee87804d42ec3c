use std::{future::Future, io, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{
    directory::SessionDirectory, registry::FileRegistry, router::BroadcastRouter, session,
    transfer,
};

/// The relay server: one listener for the line-oriented chat channel, one
/// for the binary file channel, and the two stores every handler shares.
///
/// The stores are constructed here and handed to each spawned handler by
/// `Arc`; nothing in the crate reaches for process-wide state.
pub struct Server {
    chat_listener: TcpListener,
    file_listener: TcpListener,
    directory: Arc<SessionDirectory>,
    registry: Arc<FileRegistry>,
    router: Arc<BroadcastRouter>,
    storage_dir: PathBuf,
}

impl Server {
    pub fn new(chat_listener: TcpListener, file_listener: TcpListener, storage_dir: PathBuf) -> Self {
        let directory = Arc::new(SessionDirectory::new());
        let registry = Arc::new(FileRegistry::new());
        let router = Arc::new(BroadcastRouter::new(Arc::clone(&directory)));
        Self {
            chat_listener,
            file_listener,
            directory,
            registry,
            router,
            storage_dir,
        }
    }

    /// Bound addresses as `(chat, file)`. Useful when listening on port 0.
    pub fn local_addrs(&self) -> io::Result<(SocketAddr, SocketAddr)> {
        Ok((
            self.chat_listener.local_addr()?,
            self.file_listener.local_addr()?,
        ))
    }

    /// Accepts on both channels until the shutdown future resolves, spawning
    /// one task per connection. Accept errors are logged and do not stop
    /// either loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            chat_listener,
            file_listener,
            directory,
            registry,
            router,
            storage_dir,
        } = self;
        let storage_dir = Arc::new(storage_dir);
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                accept_result = chat_listener.accept() => {
                    handle_chat_accept(accept_result, &directory, &registry, &router);
                }
                accept_result = file_listener.accept() => {
                    handle_file_accept(accept_result, &registry, &storage_dir);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_chat_accept(
    result: io::Result<(TcpStream, SocketAddr)>,
    directory: &Arc<SessionDirectory>,
    registry: &Arc<FileRegistry>,
    router: &Arc<BroadcastRouter>,
) {
    match result {
        Ok((stream, peer)) => {
            info!(%peer, "chat client connected");
            let directory = Arc::clone(directory);
            let registry = Arc::clone(registry);
            let router = Arc::clone(router);
            tokio::spawn(async move {
                if let Err(err) = session::handle_session(stream, directory, registry, router).await
                {
                    warn!(%peer, error = ?err, "chat session closed with error");
                }
            });
        }
        Err(err) => warn!(error = ?err, "failed to accept chat connection"),
    }
}

fn handle_file_accept(
    result: io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<FileRegistry>,
    storage_dir: &Arc<PathBuf>,
) {
    match result {
        Ok((stream, peer)) => {
            info!(%peer, "file client connected");
            let registry = Arc::clone(registry);
            let storage_dir = Arc::clone(storage_dir);
            tokio::spawn(async move {
                if let Err(err) = transfer::handle_transfer(stream, registry, &storage_dir).await {
                    warn!(%peer, error = ?err, "file transfer closed with error");
                }
            });
        }
        Err(err) => warn!(error = ?err, "failed to accept file connection"),
    }
}
