//! Minimal submission client: renders a file-dispatch request in the text
//! grammar and hands it to the local daemon, which does the actual transfer.

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, Level};

use dispatch::config::DEFAULT_PORT;
use dispatch::protocol::request::{self, RequestToken, ARG_FILE, ARG_RECIPIENT};

const CLIENT_PROTOCOL_VERSION: u32 = 1;

#[derive(Parser)]
struct Args {
    /// Daemon to submit the request to
    #[clap(default_value = "127.0.0.1")]
    host: String,

    #[clap(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// File to dispatch
    #[clap(short, long)]
    file: String,

    /// Recipient, as user@domain
    #[clap(short, long)]
    recipient: String,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let tokens = vec![
        RequestToken::new(ARG_FILE, &args.file),
        RequestToken::new(ARG_RECIPIENT, &args.recipient),
    ];
    let rendered = request::render(CLIENT_PROTOCOL_VERSION, &tokens);

    let mut stream = TcpStream::connect((args.host.as_str(), args.port)).await?;
    stream.write_all(rendered.as_bytes()).await?;
    stream.shutdown().await?;

    info!(
        "submitted {} for {} to {}:{}",
        args.file, args.recipient, args.host, args.port
    );
    Ok(())
}
