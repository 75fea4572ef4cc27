use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sift_core::{Config, Retrieval};
use sift_index::{ContextDecision, SearchHit, SearchResults};
use sift_llm::EmbeddingProvider;
use sift_llm::openai::OpenAiEmbedder;

#[derive(Parser, Debug)]
#[command(
    name = "sift",
    version,
    about = "Semantic codebase index: build, search, and decide when retrieval is needed"
)]
struct Cli {
    /// Config file (default: $SIFT_CONFIG or config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk and embed a codebase, replacing its published index
    Index {
        codebase_id: String,
        path: PathBuf,
        /// Output directory (default: index.embeddings_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Query a published index
    Search {
        codebase_id: String,
        query: String,
        /// Code results (default: search.code_count)
        #[arg(long)]
        code: Option<usize>,
        /// Markdown results (default: search.markdown_count)
        #[arg(long)]
        markdown: Option<usize>,
        /// Embeddings directory (default: index.embeddings_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decide whether a query needs codebase context
    Classify { query: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), engine = %config.embedding.engine, "config loaded");

    #[cfg(feature = "mock")]
    if std::env::var("SIFT_MOCK_EMBEDDINGS").is_ok_and(|v| v == "1" || v == "true") {
        tracing::warn!("using mock embeddings");
        let service = Retrieval::new(sift_llm::mock::MockEmbedder::default(), &config);
        return run(cli.command, &config, &service).await;
    }

    let provider = OpenAiEmbedder::new(
        config
            .embedding
            .api_key
            .as_ref()
            .map(|k| k.expose().to_owned()),
        config.embedding.base_url.clone(),
    );
    let service = Retrieval::new(provider, &config);
    run(cli.command, &config, &service).await
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SIFT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn run<P: EmbeddingProvider>(
    command: Command,
    config: &Config,
    service: &Retrieval<P>,
) -> anyhow::Result<()> {
    match command {
        Command::Index {
            codebase_id,
            path,
            out,
        } => {
            let out = out.unwrap_or_else(|| config.index.embeddings_dir.clone());
            let report = service
                .build_index(&codebase_id, &path, &out)
                .await
                .with_context(|| format!("failed to index {}", path.display()))?;
            println!(
                "indexed {} files: {} code and {} markdown chunks ({} dims) in {} ms",
                report.files_indexed,
                report.code_chunks,
                report.markdown_chunks,
                report.dimension,
                report.duration_ms
            );
        }
        Command::Search {
            codebase_id,
            query,
            code,
            markdown,
            dir,
            json,
        } => {
            let dir = dir.unwrap_or_else(|| config.index.embeddings_dir.clone());
            let index = service.load_index(&codebase_id, &dir)?;
            let results = service
                .search(
                    &index,
                    &query,
                    code.unwrap_or(config.search.code_count),
                    markdown.unwrap_or(config.search.markdown_count),
                )
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print!("{}", render_results(&results));
            }
        }
        Command::Classify { query } => {
            let decision = service.classify(&query).await?;
            println!("{}", render_decision(decision));
        }
    }
    Ok(())
}

fn render_results(results: &SearchResults) -> String {
    let mut out = String::new();
    render_partition(&mut out, "code", results.code.as_deref());
    render_partition(&mut out, "markdown", results.markdown.as_deref());
    out
}

fn render_partition(out: &mut String, label: &str, hits: Option<&[SearchHit]>) {
    use std::fmt::Write;

    let Some(hits) = hits else {
        let _ = writeln!(out, "{label}: (none indexed)");
        return;
    };
    let _ = writeln!(out, "{label}: {} results", hits.len());
    for hit in hits {
        let r = &hit.record;
        let _ = writeln!(out, "  {:.4}  {}:{}-{}", hit.score, r.file_path, r.start, r.end);
    }
}

fn render_decision(decision: ContextDecision) -> String {
    let reason = match decision {
        ContextDecision::OptOut => "opt-out prefix".to_owned(),
        ContextDecision::TooShort => "query too short".to_owned(),
        ContextDecision::InlineCode => "query includes a code block".to_owned(),
        ContextDecision::Heuristic(i) => format!("matched heuristic #{i}"),
        ContextDecision::Similarity {
            needs_score,
            no_context_score,
            ..
        } => format!("similarity needs={needs_score:.4} no_context={no_context_score:.4}"),
    };
    format!("needs context: {} ({reason})", decision.needs_context())
}
