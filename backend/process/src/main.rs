use anyhow::{Result, bail};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Seed file path or http(s) URL.
    source: Option<String>,

    /// Wipe Redis and the search index instead of loading.
    #[arg(long, conflicts_with_all = ["source", "reindex"])]
    delete: bool,

    /// Rebuild the search index from Redis.
    #[arg(long, conflicts_with = "source")]
    reindex: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    server::init_tracing();

    let args = Args::parse();
    let mut backends = process::connect().await?;

    match (args.source, args.delete, args.reindex) {
        (_, true, _) => process::delete_data(&mut backends).await,
        (_, _, true) => process::reindex(&mut backends).await,
        (Some(source), _, _) => process::load_stores(&mut backends, &source).await,
        (None, false, false) => bail!("Nothing to do: pass a seed file, --delete or --reindex"),
    }
}
