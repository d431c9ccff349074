//! `nntpd` — run the read-only NNTP server.

use std::sync::Arc;

use clap::Parser;
use pnntprss::{server, Settings};

#[derive(Parser)]
#[command(about = "Serve configured groups as read-only NNTP newsgroups")]
struct Args {
    /// Override the default `$HOME/.pnntprss` state directory.
    #[arg(long = "base-dir")]
    base_dir: Option<std::path::PathBuf>,

    /// Override the listen address, default `0.0.0.0:4321`.
    #[arg(long = "addr")]
    addr: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let mut settings = match &args.base_dir {
        Some(base_dir) => Settings::with_base_dir(base_dir),
        None => Settings::default(),
    };
    if let Some(addr) = args.addr {
        settings.nntp_addr = addr;
    }

    let _guard = match pnntprss::logging::init(&settings) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: failed to initialise logging: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = server::serve(Arc::new(settings)).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
