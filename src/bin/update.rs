//! `update` — poll all due groups, or force-poll specific ones.

use std::sync::Arc;

use clap::Parser;
use pnntprss::feed::{FeedSource, HttpFeedSource};
use pnntprss::{scheduler, Settings};

#[derive(Parser)]
#[command(about = "Poll feeds and ingest new entries")]
struct Args {
    /// Override the default `$HOME/.pnntprss` state directory.
    #[arg(long = "base-dir")]
    base_dir: Option<std::path::PathBuf>,

    /// Group names to force-poll regardless of their due time. With none given,
    /// polls every group whose interval has elapsed.
    names: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let settings = match &args.base_dir {
        Some(base_dir) => Settings::with_base_dir(base_dir),
        None => Settings::default(),
    };

    let _guard = match pnntprss::logging::init(&settings) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: failed to initialise logging: {err}");
            std::process::exit(1);
        }
    };

    let settings = Arc::new(settings);
    let source: Arc<dyn FeedSource> = match HttpFeedSource::new(&settings.user_agent, settings.socket_timeout) {
        Ok(source) => Arc::new(source),
        Err(err) => {
            eprintln!("error: failed to build feed client: {err}");
            std::process::exit(1);
        }
    };

    let result = if args.names.is_empty() {
        scheduler::run_scheduled_poll(settings, source).await
    } else {
        scheduler::run_forced_poll(settings, source, args.names).await;
        Ok(())
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
