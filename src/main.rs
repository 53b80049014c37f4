use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::select;
use tracing::Level;

use dispatch::config;
use dispatch::mailbox::delivery::MailboxDelivery;
use dispatch::mailbox::scanner;
use dispatch::net::endpoint::Endpoint;

#[derive(Parser)]
struct Args {
    /// Directory holding dp.conf, defaults to ~/.dispatch
    #[clap(long)]
    config_dir: Option<PathBuf>,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let config = Arc::new(config::load_or_init(args.config_dir).await?);
    let delivery = Arc::new(MailboxDelivery::new(&config));

    let endpoint = Endpoint::bind(config.clone(), delivery).await?;

    select! {
        result = endpoint.run() => { result }
        result = scanner::run_scanner(config) => { result }
    }
}
