//! The `pdns` binary.

mod opt;
mod web;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use pdns_ingest::index_files;
use pdns_storage::open_store;

use crate::opt::{Command, PdnsCli, SearchTarget};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(PdnsCli::parse()) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: PdnsCli) -> anyhow::Result<()> {
    if let Command::Version = cli.command {
        println!("pdns {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut store = open_store(&cli.store, &cli.uri)?;
    match cli.command {
        Command::Index { files } => index_files(store.as_mut(), &files)?,
        Command::Find { target } => match target {
            SearchTarget::Tuples { value } => print_rows(&store.find_tuples(&value)?)?,
            SearchTarget::Individual { value } => print_rows(&store.find_individual(&value)?)?,
        },
        Command::Like { target } => match target {
            SearchTarget::Tuples { value } => print_rows(&store.like_tuples(&value)?)?,
            SearchTarget::Individual { value } => print_rows(&store.like_individual(&value)?)?,
        },
        Command::DeleteOld { days } => {
            let deleted = store.delete_old(days)?;
            println!("deleted {deleted} rows older than {days} days");
        }
        Command::Web { listen } => return web::serve(store, &listen),
        Command::Version => unreachable!("handled above"),
    }
    store.close()?;
    Ok(())
}

fn print_rows<T: serde::Serialize>(rows: &[T]) -> anyhow::Result<()> {
    for row in rows {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}
