use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use lectern_core::bootstrap::{build_rag_system, resolve_config_path};
use lectern_core::config::IndexBackend;
use lectern_core::{Config, QueryAnswer, RagError, RagSystem};
use lectern_index::IngestReport;
use lectern_llm::any::AnyProvider;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Ask questions about course materials. Answers are grounded in an index of
/// course documents searched by the model.
#[derive(Debug, Parser)]
#[command(name = "lectern", version, about)]
struct Cli {
    /// Path to the TOML configuration file. Falls back to `LECTERN_CONFIG`,
    /// then `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index every course document in a folder.
    Ingest {
        /// Folder with `.txt`/`.md` (and `.pdf`) course documents. Defaults to
        /// `ingest.docs_path`.
        folder: Option<PathBuf>,

        /// Drop the existing index before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// Answer a single question.
    Ask {
        /// Folder to ingest before answering. Defaults to `ingest.docs_path`.
        #[arg(long)]
        docs: Option<PathBuf>,

        #[arg(required = true)]
        question: Vec<String>,
    },

    /// Interactive session reading questions from stdin.
    Chat {
        /// Folder to ingest before the session starts. Defaults to
        /// `ingest.docs_path`.
        #[arg(long)]
        docs: Option<PathBuf>,
    },

    /// Show the course catalog.
    Stats {
        /// Folder to ingest first. Defaults to `ingest.docs_path`.
        #[arg(long)]
        docs: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.validate()?;
    tracing::info!(
        config = %config_path.display(),
        provider = config.llm.provider.as_str(),
        "configuration loaded"
    );

    let rag = build_rag_system(&config).await?;

    match cli.command {
        Command::Ingest { folder, clear } => {
            let Some(folder) = folder.or_else(|| config.ingest.docs_path.clone()) else {
                bail!("no folder given and ingest.docs_path is not set");
            };
            if let Some(warning) = ephemeral_index_warning(&config) {
                tracing::warn!("{warning}");
            }
            let report = ingest(&rag, &folder, clear).await?;
            print!("{}", render_report(&report));
        }
        Command::Ask { docs, question } => {
            ingest_startup_docs(&rag, docs.as_deref(), &config).await;
            let question = question.join(" ");
            let answer = answer_with_interrupt(&rag, &question, None).await?;
            print!("{}", render_answer(&answer));
        }
        Command::Chat { docs } => {
            ingest_startup_docs(&rag, docs.as_deref(), &config).await;
            chat_loop(&rag).await?;
        }
        Command::Stats { docs } => {
            ingest_startup_docs(&rag, docs.as_deref(), &config).await;
            let summary = rag.catalog_summary().await?;
            println!("Courses: {}", summary.total_courses);
            for title in &summary.course_titles {
                match rag.store().catalog_entry(title).await? {
                    Some(entry) => println!("  - {title} ({} lessons)", entry.lessons.len()),
                    None => println!("  - {title}"),
                }
            }
        }
    }
    Ok(())
}

/// `ingest` against the in-memory backend indexes into a store that is gone
/// when the process exits.
fn ephemeral_index_warning(config: &Config) -> Option<&'static str> {
    (config.index.backend == IndexBackend::Memory).then_some(
        "index.backend is `memory`: this index is discarded on exit; \
         set index.backend = \"qdrant\" to keep it, or pass --docs to ask/chat/stats",
    )
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn ingest(
    rag: &RagSystem<AnyProvider>,
    folder: &Path,
    clear: bool,
) -> anyhow::Result<IngestReport> {
    rag.ingest_folder(folder, clear)
        .await
        .with_context(|| format!("failed to ingest {}", folder.display()))
}

/// The in-memory index starts empty on every run, so query commands load the
/// docs folder first. Failures are logged and the command continues.
async fn ingest_startup_docs(rag: &RagSystem<AnyProvider>, docs: Option<&Path>, config: &Config) {
    let Some(folder) = docs.or(config.ingest.docs_path.as_deref()) else {
        return;
    };
    match ingest(rag, folder, false).await {
        Ok(report) => tracing::info!(
            courses = report.courses_added,
            chunks = report.chunks_added,
            duplicates = report.duplicates.len(),
            failures = report.failures.len(),
            "startup ingestion finished"
        ),
        Err(e) => tracing::warn!("startup ingestion failed: {e:#}"),
    }
}

/// Run one query, cancelling it on Ctrl-C.
async fn answer_with_interrupt(
    rag: &RagSystem<AnyProvider>,
    question: &str,
    conversation_id: Option<&str>,
) -> Result<QueryAnswer, RagError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = rag
        .submit_query_with_cancel(question, conversation_id, &cancel)
        .await;
    watcher.abort();
    result
}

async fn chat_loop(rag: &RagSystem<AnyProvider>) -> anyhow::Result<()> {
    let mut session = rag.create_session();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Ask about your courses. `/new` starts a new conversation, `exit` quits.");

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => {}
            "exit" | "quit" => break,
            "/new" => {
                rag.end_session(&session);
                session = rag.create_session();
                println!("Started {session}.");
            }
            question => match answer_with_interrupt(rag, question, Some(&session)).await {
                Ok(answer) => print!("{}", render_answer(&answer)),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }
    Ok(())
}

fn render_answer(answer: &QueryAnswer) -> String {
    let mut out = format!("{}\n", answer.answer.trim_end());
    if answer.sources.is_empty() {
        return out;
    }
    out.push_str("\nSources:\n");
    for (i, source) in answer.sources.iter().enumerate() {
        let _ = match &source.link {
            Some(link) => writeln!(out, "  [{}] {} ({link})", i + 1, source.display_text),
            None => writeln!(out, "  [{}] {}", i + 1, source.display_text),
        };
    }
    out
}

fn render_report(report: &IngestReport) -> String {
    let mut out = format!(
        "Indexed {} course(s), {} chunk(s).\n",
        report.courses_added, report.chunks_added
    );
    for title in &report.duplicates {
        let _ = writeln!(out, "Skipped (already indexed): {title}");
    }
    for failure in &report.failures {
        let _ = writeln!(out, "Failed: {}: {}", failure.source, failure.error);
    }
    out
}
