//! Reader Server
//!
//! Converts EPUB files into reading artifacts and inspects the library.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reader_server::convert::ErrorKind;
use reader_server::document::NavigationNode;
use reader_server::library::BOOK_ID_SUFFIX;
use reader_server::{Config, ConvertError, Converter, Library};

#[derive(Parser)]
#[command(name = "reader-server", version, about = "EPUB reading artifact converter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert an EPUB into a reading artifact directory
    Convert {
        /// EPUB file to convert
        epub: PathBuf,
        /// Output directory (default: `<stem>_data` next to the EPUB)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List converted books in BOOKS_DIR
    List,
    /// Show a converted book, or one of its sections
    Show {
        book_id: String,
        /// Zero-based section index
        #[arg(short, long)]
        section: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reader_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let cli = Cli::parse();
    match cli.command {
        Command::Convert { epub, output } => convert(&config, &epub, output),
        Command::List => list(&config).await,
        Command::Show { book_id, section } => show(&config, &book_id, section).await,
    }
}

fn convert(config: &Config, epub: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let output = output.unwrap_or_else(|| default_output(epub));
    let converter = Converter::new(config.converter_options());

    let conversion = match converter.convert(epub, &output) {
        Ok(conversion) => conversion,
        Err(e) => return Err(describe_failure(e)),
    };
    let document = &conversion.document;
    let report = &conversion.report;

    println!("\n{}", "=".repeat(50));
    println!("SUCCESS: Processed {}", document.metadata.title);
    println!("{}", "=".repeat(50));
    println!("Authors:  {}", document.metadata.author_line());
    println!("Language: {}", document.metadata.language);
    println!("Sections: {}", document.spine.len());
    println!("TOC:      {} root entries", document.toc.len());
    println!("Images:   {}", document.images.asset_count());
    println!("Output:   {}", output.display());

    if !report.fallbacks.is_empty() || !report.warnings.is_empty() {
        println!("\nNotes:");
        for note in report.fallbacks.iter().chain(&report.warnings) {
            println!("  - {}", note);
        }
    }
    Ok(())
}

async fn list(config: &Config) -> anyhow::Result<()> {
    let library = Library::new(config);
    let books = library
        .list()
        .await
        .with_context(|| format!("Failed to read {}", config.books_dir.display()))?;

    if books.is_empty() {
        println!("No books found in {}", config.books_dir.display());
        return Ok(());
    }
    for book in books {
        println!("{:<40} {:<30} {:>4} sections  [{}]", book.title, book.author, book.chapters, book.id);
    }
    Ok(())
}

async fn show(config: &Config, book_id: &str, section: Option<usize>) -> anyhow::Result<()> {
    let library = Library::new(config);

    if let Some(index) = section {
        let view = library.section(book_id, index).await?;
        println!("{} ({}/{})", view.section.title, view.index + 1, view.total);
        println!("href: {}", view.section.href);
        println!(
            "prev: {}  next: {}",
            view.prev.map_or("-".to_string(), |i| i.to_string()),
            view.next.map_or("-".to_string(), |i| i.to_string())
        );
        println!("\n{}", view.section.text);
        return Ok(());
    }

    let document = library.document(book_id).await?;
    println!("{}", document.metadata.title);
    println!("by {}", document.metadata.author_line());
    println!(
        "{} sections, converted {} from {}",
        document.spine.len(),
        document.processed_at.format("%Y-%m-%d %H:%M"),
        document.source_file
    );
    println!("\nContents:");
    print_toc(&document.toc, 1);
    Ok(())
}

fn print_toc(nodes: &[NavigationNode], depth: usize) {
    for node in nodes {
        println!("{}{}  ({})", "  ".repeat(depth), node.title, node.href);
        print_toc(&node.children, depth + 1);
    }
}

/// `<dir>/<stem>_data` for an EPUB at `<dir>/<stem>.epub`
fn default_output(epub: &Path) -> PathBuf {
    let stem = epub
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    epub.with_file_name(format!("{}{}", stem, BOOK_ID_SUFFIX))
}

fn describe_failure(error: ConvertError) -> anyhow::Error {
    let summary = match error.kind() {
        ErrorKind::SourceUnreadable => "source could not be read",
        ErrorKind::NoContent => "no readable content",
        ErrorKind::Storage => "output could not be written",
    };
    anyhow::Error::new(error).context(format!("Conversion failed: {}", summary))
}
