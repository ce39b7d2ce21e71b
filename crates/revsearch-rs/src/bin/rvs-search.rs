use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use revsearch_rs::types::{packed_size, Revision};
use revsearch_rs::Index;

/// Query a revision-scoped search index.
#[derive(Parser, Debug)]
#[command(name = "rvs-search", version, about)]
struct Args {
    /// Index directory.
    index: PathBuf,
    /// Query text, e.g. 'c:"open file" *.cpp -a:alice'.
    query: String,
    /// Start of the revision range: a number, "head" or "all".
    #[arg(long, default_value = "head")]
    first: String,
    /// End of the revision range; defaults to the range start.
    #[arg(long)]
    last: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();
    let first = Revision::parse(&args.first)?;
    let last = match &args.last {
        Some(last) => Revision::parse(last)?,
        None => first,
    };

    let index = Index::open(&args.index)?;
    let result = index.query(&args.query, first, last)?;

    for hit in &result.hits {
        let size = hit
            .size
            .map(packed_size::format)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  [{}:{}]  {}  {}",
            hit.path, hit.revision_first, hit.revision_last, hit.author, size
        );
    }
    println!(
        "{} hits in {:?} ({} r{}, {} docs)",
        result.hits.len(),
        result.search_time,
        result.properties.repository_name,
        result.properties.revision.0,
        result.properties.total_count
    );
    Ok(())
}
