use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use revsearch_rs::repo::ScriptedRepository;
use revsearch_rs::types::{Credentials, Revision};
use revsearch_rs::{IndexMode, IndexOptions, Indexer};

/// Build or update a revision-scoped search index from a recorded
/// repository history.
#[derive(Parser, Debug)]
#[command(name = "rvs-index", version, about)]
struct Args {
    /// JSON history file to replay.
    history: PathBuf,
    /// Index directory.
    index: PathBuf,
    /// Continue an existing index instead of rebuilding.
    #[arg(long)]
    update: bool,
    /// Stop at this revision instead of the youngest.
    #[arg(long)]
    max_revision: Option<u32>,
    /// Worker threads for analysis and content fetching.
    #[arg(long, default_value_t = 4)]
    threads: usize,
    /// Revisions per commit batch.
    #[arg(long, default_value_t = 1000)]
    commit_interval: u32,
    /// Compact the index every N revisions (0 = only at the end).
    #[arg(long, default_value_t = 0)]
    optimize_every: u32,
    /// Regex of paths to exclude from the index.
    #[arg(long)]
    filter: Option<String>,
    /// Keep only head documents, no history windows.
    #[arg(long)]
    single_revision: bool,
    /// Display name stored with the index.
    #[arg(long)]
    name: Option<String>,
    /// Externally reachable repository URI stored with the index.
    #[arg(long)]
    external_uri: Option<String>,
    /// Repository username, stored obfuscated with the index.
    #[arg(long, default_value = "")]
    username: String,
    #[arg(long, default_value = "")]
    password: String,
    /// Largest file content to index, in bytes.
    #[arg(long, default_value_t = 1 << 20)]
    max_content_size: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let repo = Arc::new(ScriptedRepository::load(&args.history)?);
    let name = args
        .name
        .clone()
        .or_else(|| {
            args.history
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "repository".to_string());

    let mode = if args.update {
        IndexMode::Update
    } else {
        IndexMode::Create
    };
    let mut options = IndexOptions::new(&args.index, mode, &name);
    options.max_revision = args.max_revision.map(Revision);
    options.max_threads = args.threads.max(1);
    options.commit_interval = args.commit_interval.max(1);
    options.optimize_every = args.optimize_every;
    options.path_filter = args.filter;
    options.single_revision = args.single_revision;
    options.external_uri = args.external_uri;
    options.max_content_size = args.max_content_size;
    if !args.username.is_empty() || !args.password.is_empty() {
        options.credentials = Credentials::new(args.username, args.password);
    }

    Indexer::new(repo, options).run()
}
