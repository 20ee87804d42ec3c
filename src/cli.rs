use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Socket address for the line-oriented chat channel. Use port 0 for an
    /// ephemeral port.
    #[arg(long, default_value = "127.0.0.1:12345")]
    pub chat_listen: SocketAddr,

    /// Socket address for the binary file channel.
    #[arg(long, default_value = "127.0.0.1:12346")]
    pub file_listen: SocketAddr,

    /// Directory where uploaded files are stored. Created on first upload.
    #[arg(long, default_value = "server_files")]
    pub storage_dir: PathBuf,
}
