use std::path::Path;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;

pub struct ExtractStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Convert every fetched-but-unextracted PDF into a raw text document row.
///
/// Per-file decode failures are logged and counted, never fatal: scanned or
/// malformed bulletins should not stall the rest of the campaign.
pub fn extract_pending(conn: &Connection, raw_dir: &Path, limit: Option<usize>) -> Result<ExtractStats> {
    let pending = db::fetch_unextracted(conn, limit)?;
    let total = pending.len();
    if total == 0 {
        return Ok(ExtractStats { total: 0, ok: 0, errors: 0 });
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let mut ok = 0usize;
    let mut errors = 0usize;

    for bulletin in pending {
        let path = raw_dir
            .join(&bulletin.region)
            .join(bulletin.year.to_string())
            .join(&bulletin.file_name);

        match pdf_extract::extract_text(&path) {
            Ok(text) if !text.trim().is_empty() => {
                db::insert_document(conn, bulletin.id, &text)?;
                ok += 1;
            }
            Ok(_) => {
                warn!("No text layer in {} (scanned PDF?)", bulletin.file_name);
                errors += 1;
            }
            Err(e) => {
                warn!("Failed to extract {}: {}", bulletin.file_name, e);
                errors += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Extracted {} PDFs ({} ok, {} errors)", total, ok, errors);
    Ok(ExtractStats { total, ok, errors })
}
