//! `admin` — create, delete, inspect, and reconfigure groups.

use clap::Parser;
use pnntprss::interval::describe_interval;
use pnntprss::{GroupConfig, GroupStore, Settings};

#[derive(Parser)]
#[command(about = "Manage pnntprss newsgroups")]
struct Args {
    #[arg(short = 'a', long = "add-group")]
    add_group: bool,

    #[arg(short = 'd', long = "delete-group")]
    delete_group: bool,

    #[arg(short = 'u', long = "uri")]
    uri: Option<String>,

    #[arg(short = 'l', long = "article-lifetime")]
    article_lifetime: Option<String>,

    /// Override the default `$HOME/.pnntprss` state directory.
    #[arg(long = "base-dir")]
    base_dir: Option<std::path::PathBuf>,

    /// Group names: zero, one, or many depending on the operation.
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

    let result = if args.add_group {
        add_group(&store, &args)
    } else if args.delete_group {
        delete_groups(&store, &args.names)
    } else if let Some(lifetime) = &args.article_lifetime {
        set_lifetime(&store, lifetime, &args.names)
    } else if args.names.is_empty() {
        list_groups(&store)
    } else {
        display_groups(&store, &args.names)
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn add_group(store: &GroupStore, args: &Args) -> pnntprss::Result<()> {
    let [name] = args.names.as_slice() else {
        eprintln!("admin -a -u URI NAME requires exactly one group name");
        std::process::exit(1);
    };
    let href = args.uri.clone().unwrap_or_default();
    store.create(
        name,
        GroupConfig {
            href,
            ..Default::default()
        },
    )?;
    println!("created group {name}");
    Ok(())
}

fn delete_groups(store: &GroupStore, names: &[String]) -> pnntprss::Result<()> {
    for name in names {
        let group = store.load(name)?;
        group.delete()?;
        println!("deleted group {name}");
    }
    Ok(())
}

fn set_lifetime(store: &GroupStore, lifetime: &str, names: &[String]) -> pnntprss::Result<()> {
    let seconds = pnntprss::interval::parse_interval(lifetime)?;
    for name in names {
        let mut group = store.load(name)?;
        group.config.article_lifetime = Some(seconds);
        group.save_config()?;
        println!("{name}: article lifetime set to {}", describe_interval(seconds));
    }
    Ok(())
}

fn list_groups(store: &GroupStore) -> pnntprss::Result<()> {
    for name in store.list()? {
        println!("{name}");
    }
    Ok(())
}

fn display_groups(store: &GroupStore, names: &[String]) -> pnntprss::Result<()> {
    for name in names {
        let group = store.load(name)?;
        println!("Feed URI: {}", group.config.href);
        if let Some(lifetime) = group.config.article_lifetime {
            println!("Article lifetime: {}", describe_interval(lifetime));
        }
        if let Some(failed) = group.config.failed_polls {
            println!("Failed polls: {failed}");
        }
    }
    Ok(())
}
