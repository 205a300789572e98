use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};

use docqa::backend::{ChatAnswerer, HttpEmbedder};
use docqa::config::Settings;
use docqa::pipeline::{DocumentSource, PipelineOptions, RetrievalPipeline};
use docqa::segmenter::Segmenter;
use docqa::sources::{CsvQuestions, DocumentFile};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version = "0.1")]
#[command(about = "Answer a batch of questions against one document", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer every question and print the results as JSON
    Run {
        /// Document to answer against (.pdf or text)
        #[arg(long)]
        document: Option<String>,
        /// CSV file with question, type and expected values columns
        #[arg(long)]
        questions: Option<String>,
        /// Write results here instead of stdout
        #[arg(long)]
        output: Option<String>,
        /// Number of questions processed at once
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print how the document is segmented, without calling any backend
    Chunks {
        #[arg(long)]
        document: Option<String>,
    },
    /// Print the resolved configuration
    Config,
}

fn segmenter(settings: &Settings) -> Result<Segmenter> {
    Segmenter::new(settings.chunk_size, settings.chunk_overlap).context("invalid chunk window")
}

fn run_command(
    mut settings: Settings,
    document: Option<String>,
    questions: Option<String>,
    output: Option<String>,
    concurrency: Option<usize>,
) -> Result<()> {
    if let Some(document) = document {
        settings.document_path = document;
    }
    if let Some(questions) = questions {
        settings.questions_path = questions;
    }
    if let Some(concurrency) = concurrency {
        settings.concurrency = concurrency;
    }
    settings.validate()?;

    let documents = DocumentFile::new(&settings.document_path);
    let question_source = CsvQuestions::new(&settings.questions_path);
    let embedder = HttpEmbedder::from_settings(&settings)?;
    let answerer = ChatAnswerer::from_settings(&settings)?;

    let results = RetrievalPipeline::new(&documents, &question_source, &embedder, &answerer)
        .with_segmenter(segmenter(&settings)?)
        .with_options(PipelineOptions::from(&settings))
        .run()?;

    let degraded = results.iter().filter(|r| r.degraded.is_some()).count();
    tracing::info!(results = results.len(), degraded, "run complete");

    let output_json = serde_json::json!({ "results": results });
    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create output file '{}'", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &output_json)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, &output_json)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

fn chunks_command(settings: &Settings, document: Option<String>) -> Result<()> {
    let path = document.unwrap_or_else(|| settings.document_path.clone());
    let document = DocumentFile::new(&path).extract()?;
    let chunks = segmenter(settings)?.chunks(&document);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for chunk in &chunks {
        let preview: String = chunk.text.chars().take(60).collect();
        let line = serde_json::json!({
            "id": chunk.id,
            "page": chunk.page,
            "start": chunk.start,
            "end": chunk.end,
            "chars": chunk.text.chars().count(),
            "preview": preview.replace('\n', " "),
        });
        writeln!(handle, "{}", line)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    docqa::logging::init(args.verbose);
    let settings = Settings::load()?;

    match args.command {
        Commands::Run {
            document,
            questions,
            output,
            concurrency,
        } => run_command(settings, document, questions, output, concurrency)?,
        Commands::Chunks { document } => chunks_command(&settings, document)?,
        Commands::Config => settings.print_config(),
    }
    Ok(())
}
