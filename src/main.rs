use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use chat_relay::{cli::ServerArgs, server::Server};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = ServerArgs::parse();
    // Failing to bind either endpoint is the only fatal startup error.
    let chat_listener = TcpListener::bind(args.chat_listen).await?;
    let file_listener = TcpListener::bind(args.file_listen).await?;

    let server = Server::new(chat_listener, file_listener, args.storage_dir);
    let (chat_addr, file_addr) = server.local_addrs()?;
    info!("chat channel listening on {}", chat_addr);
    info!("file channel listening on {}", file_addr);

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("server exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
