use anyhow::Context;
use chrono::Utc;
use circular_ingest_core::{
    delete_by_title, initialize_schema, purge_all, CharacterNgramEmbedder, DocumentSelection,
    DocumentSession, DocumentStatus, Embedder, HttpEmbedder, HttpOcr, IngestionPipeline,
    IngestionReport, LopdfExtractor, OcrEndpointConfig, OcrEngine, PgConfig, PgSession,
    PipelineConfig, TesseractOcr, DEFAULT_DOCUMENTS_DIR, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_OCR_LANGUAGE, DEFAULT_SIMILARITY_THRESHOLD,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "circular-ingest", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Postgres user
    #[arg(long, env = "DB_USER")]
    db_user: String,

    /// Postgres password
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Postgres host
    #[arg(long, env = "HOST", default_value = "localhost")]
    db_host: String,

    /// Postgres port
    #[arg(long, env = "PORT", default_value = "5432")]
    db_port: u16,

    /// Postgres database name
    #[arg(long, env = "DB_NAME")]
    db_name: String,

    /// Folder the document identifiers are resolved against.
    #[arg(long, env = "CIRCULARS_DIR", default_value = DEFAULT_DOCUMENTS_DIR)]
    documents_dir: PathBuf,

    /// Cosine similarity above which an existing document is replaced.
    #[arg(long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    similarity_threshold: f64,

    /// Embedding dimensionality of the `content.embedding` column.
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    dimensions: usize,

    /// Embedding backend.
    #[arg(long, value_enum, default_value_t = EmbedBackend::Ngram)]
    embedder: EmbedBackend,

    /// Embedding endpoint for `--embedder http`.
    #[arg(long, env = "EMBED_URL")]
    embed_url: Option<String>,

    /// Model name sent to the embedding endpoint.
    #[arg(long, env = "EMBED_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embed_model: String,

    /// Bearer token for the embedding endpoint.
    #[arg(long, env = "EMBED_API_KEY", hide_env_values = true)]
    embed_api_key: Option<String>,

    /// OCR backend for images embedded in the PDFs.
    #[arg(long, value_enum, default_value_t = OcrBackend::Tesseract)]
    ocr: OcrBackend,

    /// Tesseract language code.
    #[arg(long, default_value = DEFAULT_OCR_LANGUAGE)]
    ocr_lang: String,

    /// Also append logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedBackend {
    /// Deterministic character trigram hashing.
    Ngram,
    /// JSON embedding endpoint.
    Http,
    /// all-MiniLM-L6-v2 via fastembed (`local-embed` feature).
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OcrBackend {
    Tesseract,
    /// Multimodal endpoint from LLM_OCR_ENDPOINT / LLM_OCR_API_KEY.
    Http,
    Off,
}

#[derive(Subcommand)]
enum Command {
    /// Create the vector extension, tables and index if missing.
    Init,
    /// Delete every stored document.
    Purge {
        /// Confirm the purge.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Delete documents by title (case-insensitive).
    Delete {
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// Ingest PDF circulars from the documents folder.
    Ingest {
        /// File names relative to the documents folder.
        files: Vec<String>,
        /// Ingest every PDF under the documents folder.
        #[arg(long, default_value_t = false, conflicts_with = "files")]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let cli = Cli::parse();

    init_tracing(cli.log_file.as_deref())?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "circular-ingest boot"
    );

    let pg = PgConfig {
        host: cli.db_host.clone(),
        port: cli.db_port,
        user: cli.db_user.clone(),
        password: cli.db_password.clone(),
        database: cli.db_name.clone(),
    };

    match &cli.command {
        Command::Init => {
            let mut session = PgSession::connect(&pg).await?;
            let result = initialize_schema(&mut session, cli.dimensions).await;
            session.close().await;
            result?;
            println!("schema ready (embedding dimensions {})", cli.dimensions);
        }
        Command::Purge { yes } => {
            if !yes {
                anyhow::bail!("refusing to purge every document without --yes");
            }
            let mut session = PgSession::connect(&pg).await?;
            let result = purge_all(&mut session).await;
            session.close().await;
            println!("deleted {} document(s)", result?);
        }
        Command::Delete { titles } => {
            let mut session = PgSession::connect(&pg).await?;
            let result = delete_by_title(&mut session, titles).await;
            session.close().await;

            let deletions = result?;
            let total: u64 = deletions.iter().map(|deletion| deletion.deleted).sum();
            for deletion in deletions {
                println!("{}: {} record(s) deleted", deletion.title, deletion.deleted);
            }
            println!("{total} record(s) deleted in total");
        }
        Command::Ingest { files, all } => {
            let pipeline = tokio::task::block_in_place(|| build_pipeline(&cli))?;
            let selection = if *all {
                pipeline.discover()?
            } else {
                match files.as_slice() {
                    [] => anyhow::bail!("name at least one file or pass --all"),
                    [single] => DocumentSelection::One(single.clone()),
                    many => DocumentSelection::Many(many.to_vec()),
                }
            };

            let mut session = PgSession::connect(&pg).await?;
            let report = pipeline.ingest(&mut session, selection).await;
            session.close().await;

            tokio::task::block_in_place(move || drop(pipeline));
            print_report(&report);
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn build_pipeline(cli: &Cli) -> anyhow::Result<IngestionPipeline> {
    let config = PipelineConfig {
        documents_dir: cli.documents_dir.clone(),
        similarity_threshold: cli.similarity_threshold,
        embedding_dimensions: cli.dimensions,
    };

    let pipeline = IngestionPipeline::new(
        config,
        Box::new(LopdfExtractor),
        build_ocr(cli)?,
        build_embedder(cli)?,
    )?;
    Ok(pipeline)
}

fn build_ocr(cli: &Cli) -> anyhow::Result<Option<Box<dyn OcrEngine + Send + Sync>>> {
    let engine: Box<dyn OcrEngine + Send + Sync> = match cli.ocr {
        OcrBackend::Off => return Ok(None),
        OcrBackend::Tesseract => Box::new(TesseractOcr::new(&cli.ocr_lang)),
        OcrBackend::Http => {
            let config = OcrEndpointConfig::from_env()
                .context("--ocr http needs LLM_OCR_ENDPOINT to be set")?;
            Box::new(HttpOcr::new(config)?)
        }
    };
    info!(ocr = engine.name(), "OCR engine ready");
    Ok(Some(engine))
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Box<dyn Embedder + Send + Sync>> {
    let embedder: Box<dyn Embedder + Send + Sync> = match cli.embedder {
        EmbedBackend::Ngram => Box::new(CharacterNgramEmbedder {
            dimensions: cli.dimensions,
        }),
        EmbedBackend::Http => {
            let url = cli
                .embed_url
                .as_deref()
                .context("--embedder http needs --embed-url")?;
            Box::new(HttpEmbedder::new(
                url,
                cli.embed_model.as_str(),
                cli.dimensions,
                cli.embed_api_key.clone(),
            )?)
        }
        EmbedBackend::Local => local_embedder()?,
    };
    info!(
        model = embedder.model_name(),
        dimensions = embedder.dimensions(),
        "embedder ready"
    );
    Ok(embedder)
}

#[cfg(feature = "local-embed")]
fn local_embedder() -> anyhow::Result<Box<dyn Embedder + Send + Sync>> {
    Ok(Box::new(circular_ingest_core::FastEmbedder::new()?))
}

#[cfg(not(feature = "local-embed"))]
fn local_embedder() -> anyhow::Result<Box<dyn Embedder + Send + Sync>> {
    anyhow::bail!("--embedder local needs the binary built with the `local-embed` feature")
}

fn print_report(report: &IngestionReport) {
    for document in &report.documents {
        match &document.status {
            DocumentStatus::Committed { metadata_id, dedup } => println!(
                "{}: committed as metadata id {} (replaced {} earlier record(s))",
                document.identifier,
                metadata_id,
                dedup.replaced_rows()
            ),
            DocumentStatus::Skipped(reason) => {
                println!("{}: skipped, {}", document.identifier, reason)
            }
            DocumentStatus::RolledBack(error) => {
                println!("{}: rolled back, {}", document.identifier, error)
            }
        }
        if document.ocr_failures > 0 {
            println!(
                "  {} of {} embedded image(s) could not be read",
                document.ocr_failures, document.images_seen
            );
        }
    }

    println!(
        "{} of {} document(s) ingested at {}",
        report.committed_count(),
        report.documents.len(),
        Utc::now().to_rfc3339()
    );
}
