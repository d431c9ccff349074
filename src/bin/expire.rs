//! `expire` — remove articles past their configured (or default) lifetime.

use std::time::SystemTime;

use clap::Parser;
use pnntprss::store::GroupStore;
use pnntprss::Settings;

#[derive(Parser)]
#[command(about = "Expire articles older than their configured lifetime")]
struct Args {
    /// Override the default `$HOME/.pnntprss` state directory.
    #[arg(long = "base-dir")]
    base_dir: Option<std::path::PathBuf>,

    /// Restrict expiry to these groups. With none given, expires across every group.
    names: Vec<String>,
}

fn main() {
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

    let store = GroupStore::new(&settings.groups_dir);

    let names = if args.names.is_empty() {
        match store.list() {
            Ok(names) => names,
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    } else {
        args.names
    };

    let now = SystemTime::now();
    for name in names {
        let mut group = match store.load(&name) {
            Ok(group) => group,
            Err(err) => {
                eprintln!("{name}: {err}");
                continue;
            }
        };
        match pnntprss::poller::expire_group(&mut group, now, settings.article_lifetime) {
            Ok(removed) if removed > 0 => println!("{name}: expired {removed} article(s)"),
            Ok(_) => {}
            Err(err) => eprintln!("{name}: {err}"),
        }
    }
}
