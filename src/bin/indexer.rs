//! Indexer binary entry point.
//!
//! Adds papers and images to the local index and searches it. Run without a
//! subcommand for an interactive numbered menu.
//!
//! # Examples
//!
//! File a paper under explicit topics:
//! ```bash
//! indexer add_paper attention.pdf --topics "NLP, Transformers"
//! ```
//!
//! Index a folder of photos in place, then search it:
//! ```bash
//! indexer batch_index_image ~/Pictures/2024
//! indexer search_image "a dog on the beach" --top-k 5
//! ```
//!
//! Interactive mode:
//! ```bash
//! indexer --store-dir embeddings
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use multimodal_indexer::{
    config::{IndexerConfig, DEFAULT_IMAGES_ROOT, DEFAULT_PAPERS_ROOT, DEFAULT_STORE_DIR},
    embedding::{
        fastembed::{parse_text_model, ClipProvider, FastEmbedProvider, DEFAULT_TEXT_MODEL},
        EmbeddingProvider,
    },
    extraction::{take_chars, PdfTextExtractor},
    ingestion::{
        ImageIngestion, ImageOutcome, IngestionError, IngestionStats, PaperIngestion, PaperOutcome,
    },
    models::{Collection, RelevanceLevel, SearchHit},
    query::{CollectionSearchEngine, QueryError, SearchEngine, SearchQuery, DEFAULT_TOP_K},
    storage::{sqlite::SqliteVectorStore, VectorStore},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Index PDF papers and images and search them with free text
#[derive(Parser, Debug)]
#[command(
    name = "indexer",
    version,
    about = "Personal semantic index for PDF papers and images",
    long_about = "Embeds PDF papers and images with local models, files papers into topic \
                  folders and answers free-text similarity queries.

EXAMPLES:
  Add a paper, topics taken from its keyword section:
    indexer add_paper paper.pdf

  Add every PDF under a folder:
    indexer batch_add_paper ~/Downloads/papers

  Search papers as JSON:
    indexer search_paper \"contrastive learning\" --format json

  Copy an image into the images folder and index it:
    indexer import_image ~/Desktop/diagram.png"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding the vector store
    #[arg(long, value_name = "DIR", env = "INDEXER_STORE_DIR", default_value = DEFAULT_STORE_DIR, global = true)]
    store_dir: PathBuf,

    /// Root folder papers are filed under, one subfolder per topic
    #[arg(long, value_name = "DIR", env = "INDEXER_PAPERS_ROOT", default_value = DEFAULT_PAPERS_ROOT, global = true)]
    papers_root: PathBuf,

    /// Destination folder of imported images
    #[arg(long, value_name = "DIR", env = "INDEXER_IMAGES_ROOT", default_value = DEFAULT_IMAGES_ROOT, global = true)]
    images_root: PathBuf,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR", env = "INDEXER_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Text embedding model used for papers
    #[arg(long, value_name = "MODEL", env = "INDEXER_TEXT_MODEL", default_value = DEFAULT_TEXT_MODEL, global = true)]
    text_model: String,

    /// Number of results to return
    #[arg(long, value_name = "N", default_value_t = DEFAULT_TOP_K, global = true)]
    top_k: usize,

    /// Output format for search results
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
#[command(rename_all = "snake_case")]
enum Command {
    /// Add a single PDF and file it under its primary topic
    AddPaper {
        path: PathBuf,

        /// Comma-separated topics; overrides the paper's keyword section
        #[arg(long, value_name = "LIST")]
        topics: Option<String>,
    },

    /// Add every PDF under a directory, recursively
    BatchAddPaper { dir: PathBuf },

    /// Search papers with free text
    SearchPaper { query: String },

    /// Search images with free text
    SearchImage { query: String },

    /// Index a single image where it lies
    IndexImage { path: PathBuf },

    /// Index every image under a directory, in place
    BatchIndexImage { dir: PathBuf },

    /// Copy an image into the images folder and index the copy
    ImportImage { path: PathBuf },
}

/// Whether a command did what was asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Done,
    Failed,
}

type TextPapers = PaperIngestion<FastEmbedProvider, PdfTextExtractor, SqliteVectorStore>;
type ClipImages = ImageIngestion<ClipProvider, SqliteVectorStore>;

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Ingestion failures that concern the item itself rather than the index.
fn is_item_failure(error: &IngestionError) -> bool {
    matches!(
        error,
        IngestionError::MissingInput(_) | IngestionError::Decode { .. } | IngestionError::InvalidInput(_)
    )
}

/// Truncate for display, on a character boundary.
fn shorten(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = take_chars(&flat, max_chars);
    if cut.len() < flat.len() {
        format!("{}...", cut)
    } else {
        flat
    }
}

fn relevance_color(relevance: RelevanceLevel) -> Color {
    match relevance {
        RelevanceLevel::Identical => Color::Green,
        RelevanceLevel::HighlySimilar => Color::Cyan,
        RelevanceLevel::Similar => Color::Yellow,
        RelevanceLevel::Relevant => Color::White,
    }
}

/// Format hits as a pretty table; papers get topic and snippet columns.
fn format_hits_table(hits: &[SearchHit], collection: Collection) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }

    let mut headers = vec!["Rank", "Filename", "Relevance", "Distance", "Path"];
    if collection == Collection::Papers {
        headers.extend(["Topics", "Snippet"]);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );

    for (idx, hit) in hits.iter().enumerate() {
        let mut row = vec![
            Cell::new(idx + 1),
            Cell::new(shorten(&hit.metadata.filename, 40)),
            Cell::new(hit.relevance.label()).fg(relevance_color(hit.relevance)),
            Cell::new(format!("{:.4}", hit.distance)),
            Cell::new(&hit.metadata.path),
        ];
        if collection == Collection::Papers {
            row.push(Cell::new(hit.metadata.topics.as_deref().unwrap_or("")));
            row.push(Cell::new(shorten(hit.metadata.snippet.as_deref().unwrap_or(""), 80)));
        }
        table.add_row(row);
    }

    table.to_string()
}

fn format_hits_json(hits: &[SearchHit]) -> Result<String> {
    serde_json::to_string_pretty(hits).context("Failed to serialize results to JSON")
}

fn print_stats(title: &str, stats: &IngestionStats, elapsed: Duration) {
    println!("\n╔════════════════════════════════════════╗");
    println!("║ {:<38} ║", title);
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!("{} files failed to process - check logs for details", stats.failed);
    }
}

fn print_paper_outcome(outcome: &PaperOutcome) {
    if !outcome.inserted {
        println!("'{}' is already indexed; the existing entry was kept.", outcome.id);
    }
    let topics = if outcome.topics.is_empty() {
        "(none)".to_string()
    } else {
        outcome.topics.join(", ")
    };
    println!("Paper:  {}", outcome.id);
    println!("Topics: {}", topics);
    if outcome.relocated {
        println!("Filed:  {}", outcome.path.display());
    } else {
        println!("Kept at {} (could not move into '{}')", outcome.path.display(), outcome.primary_topic);
    }
}

fn print_image_outcome(outcome: &ImageOutcome) {
    if outcome.inserted {
        println!(
            "Indexed {} ({}x{}) at {}",
            outcome.id,
            outcome.width,
            outcome.height,
            outcome.path.display()
        );
    } else {
        println!("'{}' is already indexed; the existing entry was kept.", outcome.id);
    }
}

/// Store handle plus lazily loaded models, shared by every command of a run.
struct Session {
    config: IndexerConfig,
    top_k: usize,
    format: OutputFormat,
    store: Arc<SqliteVectorStore>,
    text_provider: Option<Arc<FastEmbedProvider>>,
    clip_provider: Option<Arc<ClipProvider>>,
}

impl Session {
    fn open(config: IndexerConfig, top_k: usize, format: OutputFormat) -> Result<Self> {
        let store = SqliteVectorStore::open(&config.store_dir).with_context(|| {
            format!("Failed to open vector store in {}", config.store_dir.display())
        })?;

        Ok(Self {
            config,
            top_k,
            format,
            store: Arc::new(store),
            text_provider: None,
            clip_provider: None,
        })
    }

    fn text_provider(&mut self) -> Result<Arc<FastEmbedProvider>> {
        if let Some(provider) = &self.text_provider {
            return Ok(provider.clone());
        }

        let model = parse_text_model(&self.config.text_model)
            .with_context(|| format!("Unknown text model '{}'", self.config.text_model))?;
        let progress = spinner(format!("Loading text model {}", self.config.text_model));
        let provider = FastEmbedProvider::new(Some(model), self.config.cache_dir.as_deref());
        progress.finish_and_clear();

        let provider = Arc::new(provider.context("Failed to initialize text embedding model")?);
        info!("Text model ready: {:?}", provider);
        self.text_provider = Some(provider.clone());
        Ok(provider)
    }

    fn clip_provider(&mut self) -> Result<Arc<ClipProvider>> {
        if let Some(provider) = &self.clip_provider {
            return Ok(provider.clone());
        }

        let progress = spinner("Loading CLIP image/text model".to_string());
        let provider = ClipProvider::new(self.config.cache_dir.as_deref());
        progress.finish_and_clear();

        let provider = Arc::new(provider.context("Failed to initialize CLIP model")?);
        info!("CLIP model ready");
        self.clip_provider = Some(provider.clone());
        Ok(provider)
    }

    async fn papers(&mut self) -> Result<TextPapers> {
        let provider = self.text_provider()?;
        PaperIngestion::connect(
            provider,
            PdfTextExtractor::new(),
            self.store.clone(),
            self.config.papers_root.clone(),
        )
        .await
        .context("Failed to open the papers collection")
    }

    async fn images(&mut self) -> Result<ClipImages> {
        let provider = self.clip_provider()?;
        ImageIngestion::connect(provider, self.store.clone(), self.config.images_root.clone())
            .await
            .context("Failed to open the images collection")
    }

    async fn execute(&mut self, command: Command) -> Result<Status> {
        debug!("Executing {:?}", command);
        match command {
            Command::AddPaper { path, topics } => {
                let papers = self.papers().await?;
                match papers.process_paper(&path, topics.as_deref()).await {
                    Ok(outcome) => {
                        print_paper_outcome(&outcome);
                        Ok(Status::Done)
                    }
                    Err(e) => self.report_item_failure(e),
                }
            }
            Command::BatchAddPaper { dir } => {
                let papers = self.papers().await?;
                self.run_batch("Paper Ingestion Completed", &dir, |dir| async move {
                    papers.process_directory(&dir).await
                })
                .await
            }
            Command::SearchPaper { query } => {
                let provider = self.text_provider()?;
                let engine = self.search_engine(provider, Collection::Papers).await?;
                self.search(&engine, query).await
            }
            Command::SearchImage { query } => {
                let provider = self.clip_provider()?;
                let engine = self.search_engine(provider, Collection::Images).await?;
                self.search(&engine, query).await
            }
            Command::IndexImage { path } => {
                let images = self.images().await?;
                match images.process_image(&path).await {
                    Ok(outcome) => {
                        print_image_outcome(&outcome);
                        Ok(Status::Done)
                    }
                    Err(e) => self.report_item_failure(e),
                }
            }
            Command::BatchIndexImage { dir } => {
                let images = self.images().await?;
                self.run_batch("Image Indexing Completed", &dir, |dir| async move {
                    images.process_directory(&dir).await
                })
                .await
            }
            Command::ImportImage { path } => {
                let images = self.images().await?;
                match images.import_image(&path).await {
                    Ok(outcome) => {
                        print_image_outcome(&outcome);
                        Ok(Status::Done)
                    }
                    Err(e) => self.report_item_failure(e),
                }
            }
        }
    }

    fn report_item_failure(&self, error: IngestionError) -> Result<Status> {
        if is_item_failure(&error) {
            eprintln!("{}", error);
            Ok(Status::Failed)
        } else {
            Err(error).context("Ingestion failed")
        }
    }

    async fn run_batch<F, Fut>(&self, title: &str, dir: &Path, run: F) -> Result<Status>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: std::future::Future<Output = Result<IngestionStats, IngestionError>>,
    {
        let start = Instant::now();
        match run(dir.to_path_buf()).await {
            Ok(stats) => {
                print_stats(title, &stats, start.elapsed());
                Ok(Status::Done)
            }
            Err(e) => self.report_item_failure(e),
        }
    }

    /// Engine over `collection`, creating it if nothing was indexed yet.
    async fn search_engine<E>(
        &self,
        provider: Arc<E>,
        collection: Collection,
    ) -> Result<CollectionSearchEngine<E, SqliteVectorStore>>
    where
        E: EmbeddingProvider,
    {
        self.store
            .ensure_collection(collection, &provider.config())
            .await
            .with_context(|| format!("Failed to open the {} collection", collection))?;
        Ok(CollectionSearchEngine::new(provider, self.store.clone(), collection))
    }

    async fn search<E>(&self, engine: &CollectionSearchEngine<E, SqliteVectorStore>, query: String) -> Result<Status>
    where
        E: EmbeddingProvider,
    {
        let start = Instant::now();
        let query = SearchQuery::new(query, Some(self.top_k));

        let hits = match engine.search(&query).await {
            Ok(hits) => hits,
            Err(QueryError::InvalidQuery(reason)) => {
                eprintln!("Invalid query: {}", reason);
                return Ok(Status::Failed);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to execute search for query: '{}'", query.query))
            }
        };
        let elapsed = start.elapsed();

        match self.format {
            OutputFormat::Table => {
                println!("{}", format_hits_table(&hits, engine.collection()));
                println!("\nFound {} results in {:.2}s", hits.len(), elapsed.as_secs_f64());
            }
            OutputFormat::Json => println!("{}", format_hits_json(&hits)?),
        }
        Ok(Status::Done)
    }
}

const MENU: &str = "\
Multimodal Indexer
  1) Add paper
  2) Batch add papers
  3) Search papers
  4) Search images
  5) Index image
  6) Batch index images
  7) Import image
  0) Quit";

/// Read one line; `None` on Ctrl+C / Ctrl+D.
fn prompt(rl: &mut DefaultEditor, label: &str) -> Result<Option<String>> {
    match rl.readline(label) {
        Ok(line) => {
            let line = line.trim().to_string();
            if !line.is_empty() {
                rl.add_history_entry(line.as_str()).ok();
            }
            Ok(Some(line))
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(e) => Err(e).context("Error reading input"),
    }
}

/// Turn a menu choice into a command by asking for its argument.
fn read_menu_command(rl: &mut DefaultEditor, choice: &str) -> Result<Option<Command>> {
    let label = match choice {
        "1" | "5" | "7" => "Path: ",
        "2" | "6" => "Directory: ",
        "3" | "4" => "Query: ",
        _ => {
            eprintln!("Unknown option: {}", choice);
            return Ok(None);
        }
    };

    let Some(value) = prompt(rl, label)? else {
        return Ok(None);
    };
    if value.is_empty() {
        eprintln!("Nothing entered.");
        return Ok(None);
    }

    let command = match choice {
        "1" => {
            let topics = prompt(rl, "Topics (comma-separated, blank to detect): ")?
                .filter(|topics| !topics.is_empty());
            Command::AddPaper {
                path: PathBuf::from(value),
                topics,
            }
        }
        "2" => Command::BatchAddPaper { dir: PathBuf::from(value) },
        "3" => Command::SearchPaper { query: value },
        "4" => Command::SearchImage { query: value },
        "5" => Command::IndexImage { path: PathBuf::from(value) },
        "6" => Command::BatchIndexImage { dir: PathBuf::from(value) },
        _ => Command::ImportImage { path: PathBuf::from(value) },
    };
    Ok(Some(command))
}

/// Run the interactive numbered menu
async fn run_interactive(session: &mut Session) -> Result<()> {
    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    loop {
        println!("\n{}", MENU);
        let Some(choice) = prompt(&mut rl, "Select> ")? else {
            break;
        };

        match choice.as_str() {
            "" => continue,
            "0" | "q" | "quit" => break,
            _ => {}
        }

        let Some(command) = read_menu_command(&mut rl, &choice)? else {
            continue;
        };

        if let Err(e) = session.execute(command).await {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    let config = IndexerConfig {
        store_dir: args.store_dir,
        papers_root: args.papers_root,
        images_root: args.images_root,
        cache_dir: args.cache_dir.or_else(multimodal_indexer::config::default_cache_dir),
        text_model: args.text_model,
    };
    info!("Using store directory {}", config.store_dir.display());

    let mut session = Session::open(config, args.top_k, args.format)?;

    match args.command {
        Some(command) => {
            if session.execute(command).await? == Status::Failed {
                std::process::exit(1);
            }
        }
        None => run_interactive(&mut session).await?,
    }

    Ok(())
}
