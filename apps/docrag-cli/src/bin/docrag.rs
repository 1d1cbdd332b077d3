use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docrag_core::config::{Config, Settings};
use docrag_core::corpus::{corpus_from_dir, load_corpus, save_corpus};
use docrag_core::ChunkingConfig;
use docrag_embed::get_default_embedder;
use docrag_rag::{open_collection, IndexingPipeline, Retriever};
use docrag_vector::IndexStore;

const DEFAULT_CORPUS: &str = "data/processed/extracted_texts.json";

#[derive(Parser)]
#[command(name = "docrag", version, about = "Index documents and retrieve grounding context")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store a corpus
    Index {
        /// Corpus JSON file (`{"<doc id>": "<text>"}`)
        corpus: Option<PathBuf>,
        /// Read `.txt` files from this directory instead of a corpus file
        #[arg(long, conflicts_with = "corpus")]
        dir: Option<PathBuf>,
        /// Replace the collection's contents once the new corpus is embedded
        #[arg(long)]
        rebuild: bool,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Retrieve context for a question
    Query {
        question: String,
        #[arg(short = 'k', long)]
        k: Option<usize>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what the store holds
    Status,
    /// Build a corpus JSON file from a directory of `.txt` files
    Extract { dir: PathBuf, out: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;
    let mut settings = config.settings()?;

    match cli.command {
        Command::Index { corpus, dir, rebuild, chunk_size, overlap } => {
            settings.chunking = ChunkingConfig::new(
                chunk_size.unwrap_or(settings.chunking.chunk_size),
                overlap.unwrap_or(settings.chunking.overlap),
            );
            settings.validate()?;
            index(&settings, corpus, dir, rebuild).await
        }
        Command::Query { question, k, json } => query(&settings, &question, k, json).await,
        Command::Status => status(&settings).await,
        Command::Extract { dir, out } => {
            let corpus = corpus_from_dir(&dir)?;
            save_corpus(&out, &corpus)?;
            println!("Wrote {} documents to {}", corpus.len(), out.display());
            Ok(())
        }
    }
}

async fn index(settings: &Settings, corpus: Option<PathBuf>, dir: Option<PathBuf>, rebuild: bool) -> Result<()> {
    let corpus = match dir {
        Some(dir) => corpus_from_dir(&dir)?,
        None => {
            let path = corpus.unwrap_or_else(|| PathBuf::from(DEFAULT_CORPUS));
            load_corpus(&path).with_context(|| format!("run `docrag extract` first or pass a corpus file ({})", path.display()))?
        }
    };

    let embedder = get_default_embedder(&settings.embed)?;
    let collection = open_collection(&settings.store).await?;
    println!(
        "Indexing {} documents into '{}' at {} (chunk_size={}, overlap={})",
        corpus.len(),
        collection.name(),
        settings.store.resolved_path().display(),
        settings.chunking.chunk_size,
        settings.chunking.overlap
    );
    let pipeline = IndexingPipeline::from_settings(collection, embedder, settings);
    let added = if rebuild { pipeline.rebuild(&corpus).await? } else { pipeline.build(&corpus).await? };
    println!("Stored {} chunks; collection now holds {}", added, pipeline.collection().count().await?);
    Ok(())
}

async fn query(settings: &Settings, question: &str, k: Option<usize>, json: bool) -> Result<()> {
    let collection = open_collection(&settings.store).await?;
    let embedder = get_default_embedder(&settings.embed)?;
    let grounded = Retriever::new(collection, embedder)
        .ground(question, k.unwrap_or(settings.retrieval.top_k))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&grounded)?);
        return Ok(());
    }
    if grounded.hits.is_empty() {
        println!("No relevant documents found.");
        return Ok(());
    }
    println!("{}", grounded.context);
    println!("Sources ({} chunks used):", grounded.context_used);
    for source in &grounded.sources {
        println!("  - {source}");
    }
    Ok(())
}

async fn status(settings: &Settings) -> Result<()> {
    let store = IndexStore::open(&settings.store.resolved_path()).await?;
    let collection = store.open_or_create(&settings.store.collection).await?;
    println!("Store:       {}", store.path().display());
    println!("Collection:  {}", collection.name());
    println!("Records:     {}", collection.count().await?);
    match collection.dim().await? {
        Some(dim) => println!("Dimensions:  {dim}"),
        None => println!("Dimensions:  (not set)"),
    }
    println!("Embedder:    {}", collection.embedder_id().await?.unwrap_or_else(|| "(none)".into()));
    println!("Collections: {}", store.collections().await?.join(", "));
    Ok(())
}
