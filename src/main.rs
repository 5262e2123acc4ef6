mod config;
mod db;
mod engine;
mod extract;
mod fetch;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::Datelike;
use clap::{Parser, Subcommand};

use config::Config;
use engine::lexicon::Lexicon;
use engine::tokenize::UnicodeTokenizer;

#[derive(Parser)]
#[command(name = "bsv_parser", about = "DRAAF plant-health bulletin (BSV) structure parser")]
struct Cli {
    /// Path to a config file (defaults to ./config.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover campaign PDFs and download them
    Fetch {
        #[arg(long, default_value = "bourgogne_franche_comte")]
        region: String,
        #[arg(long, default_value = "grandes_cultures")]
        culture: String,
        /// How many campaign years to cover, counting back from origin
        #[arg(long, default_value = "3")]
        years: i32,
        /// First year NOT covered (defaults to the current year)
        #[arg(long)]
        origin_year: Option<i32>,
        /// Max PDFs to download (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Convert downloaded PDFs to raw text
    Extract {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Normalize raw text (page numbers, hyphenation, spacing)
    Clean {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Segment cleaned bulletins into crop/topic sections
    Parse {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Skip writing per-bulletin JSON files under data/structured
        #[arg(long)]
        no_json: bool,
    },
    /// Full pipeline: fetch + extract + clean + parse
    Run {
        #[arg(long, default_value = "bourgogne_franche_comte")]
        region: String,
        #[arg(long, default_value = "grandes_cultures")]
        culture: String,
        #[arg(long, default_value = "3")]
        years: i32,
        #[arg(long)]
        origin_year: Option<i32>,
    },
    /// Pipeline progress counters
    Stats,
    /// Per-crop totals across parsed bulletins
    Overview {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Fetch { region, culture, years, origin_year, limit } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let origin = origin_year.unwrap_or_else(|| chrono::Utc::now().year());
            let new = fetch::discover_bulletins(&conn, &cfg.fetch, &region, &culture, origin, years)
                .await?;
            println!("Registered {} new bulletins", new);
            let stats = fetch::download_pending(&conn, &cfg.fetch, &cfg.raw_dir(), limit).await?;
            println!(
                "Fetched {}: {} downloaded, {} already present, {} errors",
                stats.total, stats.ok, stats.skipped, stats.errors
            );
            Ok(())
        }
        Commands::Extract { limit } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let stats = extract::extract_pending(&conn, &cfg.raw_dir(), limit)?;
            if stats.total == 0 {
                println!("No PDFs waiting for extraction. Run 'fetch' first.");
            } else {
                println!("Extracted {}: {} ok, {} errors", stats.total, stats.ok, stats.errors);
            }
            Ok(())
        }
        Commands::Clean { limit } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let cleaned = clean_documents(&conn, limit)?;
            if cleaned == 0 {
                println!("No documents waiting for cleaning. Run 'extract' first.");
            } else {
                println!("Cleaned {} documents", cleaned);
            }
            Ok(())
        }
        Commands::Parse { limit, no_json } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let docs = db::fetch_unparsed(&conn, limit)?;
            if docs.is_empty() {
                println!("No documents waiting for parsing. Run 'clean' first.");
                return Ok(());
            }
            println!("Parsing {} documents...", docs.len());
            let counts = parse_documents(&conn, &cfg, &docs, !no_json)?;
            counts.print();
            Ok(())
        }
        Commands::Run { region, culture, years, origin_year } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let origin = origin_year.unwrap_or_else(|| chrono::Utc::now().year());

            fetch::discover_bulletins(&conn, &cfg.fetch, &region, &culture, origin, years).await?;
            let f = fetch::download_pending(&conn, &cfg.fetch, &cfg.raw_dir(), None).await?;
            println!(
                "Fetched {} ({} new, {} present, {} errors)",
                f.total, f.ok, f.skipped, f.errors
            );

            let e = extract::extract_pending(&conn, &cfg.raw_dir(), None)?;
            println!("Extracted {} ({} ok, {} errors)", e.total, e.ok, e.errors);

            let cleaned = clean_documents(&conn, None)?;
            println!("Cleaned {} documents", cleaned);

            let docs = db::fetch_unparsed(&conn, None)?;
            if docs.is_empty() {
                println!("Nothing to parse.");
                return Ok(());
            }
            let counts = parse_documents(&conn, &cfg, &docs, true)?;
            counts.print();
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Bulletins: {}", s.bulletins);
            println!("Fetched:   {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Extracted: {}", s.extracted);
            println!("Cleaned:   {}", s.cleaned);
            println!("Parsed:    {}", s.parsed);
            Ok(())
        }
        Commands::Overview { limit } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_crop_overview(&conn, limit)?;
            if rows.is_empty() {
                println!("No parsed bulletins yet.");
                return Ok(());
            }
            println!(
                "{:<24} | {:>9} | {:>6} | {:>6}",
                "Crop", "Bulletins", "Topics", "Blocks"
            );
            println!("{}", "-".repeat(55));
            for r in &rows {
                println!(
                    "{:<24} | {:>9} | {:>6} | {:>6}",
                    truncate(&r.crop, 24),
                    r.documents,
                    r.topics,
                    r.blocks
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn clean_documents(conn: &rusqlite::Connection, limit: Option<usize>) -> Result<usize> {
    let docs = db::fetch_uncleaned(conn, limit)?;
    let mut total_before = 0usize;
    let mut total_after = 0usize;
    let mut lines_removed = 0usize;
    for doc in &docs {
        let (cleaned, stats) = engine::clean::clean_text(&doc.raw_text);
        total_before += stats.chars_before;
        total_after += stats.chars_after;
        lines_removed += stats.lines_before.saturating_sub(stats.lines_after);
        db::save_cleaned(conn, doc.id, &cleaned, stats.reduction_pct())?;
    }
    if total_before > 0 {
        let pct = (total_before - total_after) as f64 / total_before as f64 * 100.0;
        println!(
            "Characters: {} -> {} ({:.1}% reduction, {} lines removed)",
            total_before, total_after, pct, lines_removed
        );
    }
    Ok(docs.len())
}

struct ParseCounts {
    documents: usize,
    crops: usize,
    blocks: usize,
}

impl ParseCounts {
    fn print(&self) {
        println!(
            "Parsed {} documents into {} crop sections, {} content blocks.",
            self.documents, self.crops, self.blocks
        );
    }
}

fn parse_documents(
    conn: &rusqlite::Connection,
    cfg: &Config,
    docs: &[db::CleanDocument],
    write_json: bool,
) -> Result<ParseCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let lexicon = Lexicon::from(&cfg.lexicon);
    for category in lexicon.empty_categories() {
        tracing::warn!("Lexicon category {} has no phrases", category);
    }

    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ParseCounts { documents: 0, crops: 0, blocks: 0 };

    for chunk in docs.chunks(100) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|doc| {
                engine::extract_structure(
                    &doc.cleaned_text,
                    &UnicodeTokenizer,
                    &lexicon,
                    &cfg.validator,
                )
                .map(|structured| (doc, structured))
            })
            .collect::<Result<_, _>>()?;

        let mut rows = Vec::with_capacity(results.len());
        for (doc, structured) in results {
            counts.documents += 1;
            counts.crops += structured.len();
            counts.blocks += structured.values().flat_map(|t| t.values()).map(Vec::len).sum::<usize>();

            if write_json {
                let dir = cfg.structured_dir().join(&doc.region).join(doc.year.to_string());
                std::fs::create_dir_all(&dir)?;
                let name = doc.file_name.trim_end_matches(".pdf");
                let path = dir.join(format!("{}.json", name));
                std::fs::write(&path, serde_json::to_string_pretty(&structured)?)?;
            }

            rows.push(db::StructureRow {
                document_id: doc.id,
                document: structured,
            });
        }
        db::save_structures(conn, &rows)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
