use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::db::{self, BulletinRef, FetchRow, NewBulletin};

const BASE_BACKOFF_MS: u64 = 2000;
/// Anything smaller than this is a truncated or error-page download.
const MIN_PDF_BYTES: u64 = 1000;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).unwrap());
static ORIGIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(https?://[^/]+)").unwrap());

pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Walk the DRAAF campaign index for a region/culture, collect per-year
/// bulletin PDF links, and register them in the catalog.
pub async fn discover_bulletins(
    conn: &Connection,
    cfg: &FetchConfig,
    region: &str,
    culture: &str,
    origin_year: i32,
    year_count: i32,
) -> Result<usize> {
    let campaign_path = cfg
        .regions
        .get(region)
        .and_then(|cultures| cultures.get(culture))
        .with_context(|| format!("No campaign configured for {region}/{culture}"))?;

    let client = http_client(cfg)?;
    let index_url = format!("{}{}", cfg.base_url.trim_end_matches('/'), campaign_path);
    info!("Fetching campaign index: {}", index_url);
    let index_html = client
        .get(&index_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch campaign index page")?;

    let mut inserted = 0;
    for year in ((origin_year - year_count)..origin_year).rev() {
        let needle = year.to_string();
        let Some(year_href) = links_in(&index_html).into_iter().find(|h| h.contains(&needle))
        else {
            warn!("No campaign link found for {}", year);
            continue;
        };
        let year_url = absolutize(&index_url, &year_href);

        let year_html = match client.get(&year_url).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.text().await?,
                Err(e) => {
                    warn!("Campaign page for {} returned {}", year, e);
                    continue;
                }
            },
            Err(e) => {
                warn!("Failed to fetch campaign page for {}: {}", year, e);
                continue;
            }
        };

        let mut pdf_urls: Vec<String> = links_in(&year_html)
            .into_iter()
            .filter(|h| h.ends_with(".pdf"))
            .map(|h| absolutize(&year_url, &h))
            .collect();
        pdf_urls.dedup();

        let bulletins: Vec<NewBulletin> = pdf_urls
            .into_iter()
            .filter_map(|url| {
                let file_name = url.rsplit('/').next()?.to_string();
                Some(NewBulletin {
                    region: region.to_string(),
                    year,
                    url,
                    file_name,
                })
            })
            .collect();

        let new = db::insert_bulletins(conn, &bulletins)?;
        info!("{}: {} bulletins found, {} new", year, bulletins.len(), new);
        inserted += new;
    }

    Ok(inserted)
}

/// Download every registered-but-unfetched PDF, streaming results to the
/// catalog as they arrive. Files already on disk (and plausibly complete)
/// are skipped without a network round-trip.
pub async fn download_pending(
    conn: &Connection,
    cfg: &FetchConfig,
    raw_dir: &Path,
    limit: Option<usize>,
) -> Result<FetchStats> {
    let pending = db::fetch_unfetched(conn, limit)?;
    let total = pending.len();
    if total == 0 {
        return Ok(FetchStats { total: 0, ok: 0, skipped: 0, errors: 0 });
    }

    let client = http_client(cfg)?;
    let semaphore = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
    let max_retries = cfg.max_retries;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    struct Downloaded {
        row: FetchRow,
        skipped: bool,
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Downloaded>(cfg.concurrency.max(1) * 2);

    for bulletin in pending {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let dest = raw_dir
            .join(&bulletin.region)
            .join(bulletin.year.to_string())
            .join(&bulletin.file_name);

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let result = download_with_retry(&client, &bulletin, &dest, max_retries).await;
            let downloaded = match result {
                Ok(skipped) => Downloaded {
                    row: FetchRow {
                        bulletin_id: bulletin.id,
                        error: None,
                    },
                    skipped,
                },
                Err(e) => {
                    warn!("Download failed for {}: {}", bulletin.file_name, e);
                    Downloaded {
                        row: FetchRow {
                            bulletin_id: bulletin.id,
                            error: Some(e.to_string()),
                        },
                        skipped: false,
                    }
                }
            };
            let _ = tx.send(downloaded).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish.
    drop(tx);

    let mut ok = 0usize;
    let mut skipped = 0usize;
    let mut errors = 0usize;
    let mut update_stmt = conn.prepare(db::MARK_FETCHED_SQL)?;

    while let Some(done) = rx.recv().await {
        if done.row.error.is_some() {
            errors += 1;
        } else if done.skipped {
            skipped += 1;
        } else {
            ok += 1;
        }
        db::mark_fetched(&mut update_stmt, &done.row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Fetched {} bulletins ({} downloaded, {} already present, {} errors)",
        total, ok, skipped, errors
    );

    Ok(FetchStats { total, ok, skipped, errors })
}

fn http_client(cfg: &FetchConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()?)
}

/// Returns Ok(true) when the file was already on disk.
async fn download_with_retry(
    client: &reqwest::Client,
    bulletin: &BulletinRef,
    dest: &Path,
    max_retries: u32,
) -> Result<bool> {
    if let Ok(meta) = tokio::fs::metadata(dest).await {
        if meta.len() >= MIN_PDF_BYTES {
            return Ok(true);
        }
        // Leftover from an interrupted download.
        let _ = tokio::fs::remove_file(dest).await;
    }

    let mut attempt = 0;
    loop {
        match download_one(client, &bulletin.url, dest).await {
            Ok(()) => return Ok(false),
            Err(e) if attempt < max_retries && is_retryable(&e) => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "Retrying {} (attempt {}/{}) after {:.1}s: {}",
                    bulletin.file_name,
                    attempt + 1,
                    max_retries,
                    backoff.as_secs_f64(),
                    e
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_retryable(e: &anyhow::Error) -> bool {
    let msg = e.to_string();
    msg.contains("429") || msg.contains("500") || msg.contains("502") || msg.contains("503")
}

async fn download_one(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    if (bytes.len() as u64) < MIN_PDF_BYTES {
        anyhow::bail!("Downloaded file too small ({} bytes)", bytes.len());
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, &bytes).await?;
    Ok(())
}

/// All href targets on a page, in document order.
fn links_in(html: &str) -> Vec<String> {
    HREF_RE
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

/// Resolve an href against the page it appeared on. Handles absolute URLs,
/// site-root paths, and page-relative paths; anything else passes through.
fn absolutize(page_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let Some(origin) = ORIGIN_RE.captures(page_url).map(|c| c[1].to_string()) else {
        return href.to_string();
    };
    if let Some(path) = href.strip_prefix('/') {
        return format!("{}/{}", origin, path);
    }
    let base = page_url
        .trim_end_matches('/')
        .rsplit_once('/')
        .map(|(head, _)| head.to_string())
        .unwrap_or(origin);
    format!("{}/{}", base, href)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hrefs_in_order() {
        let html = r#"<a href="/a.pdf">A</a> <p>x</p> <a href="https://x.fr/b.pdf">B</a>"#;
        assert_eq!(links_in(html), vec!["/a.pdf", "https://x.fr/b.pdf"]);
    }

    #[test]
    fn absolute_hrefs_pass_through() {
        assert_eq!(
            absolutize("https://draaf.fr/bsv/2022", "https://autre.fr/doc.pdf"),
            "https://autre.fr/doc.pdf"
        );
    }

    #[test]
    fn root_relative_hrefs_use_the_origin() {
        assert_eq!(
            absolutize("https://draaf.fr/bsv/2022", "/IMG/pdf/bsv_1.pdf"),
            "https://draaf.fr/IMG/pdf/bsv_1.pdf"
        );
    }

    #[test]
    fn page_relative_hrefs_use_the_parent_path() {
        assert_eq!(
            absolutize("https://draaf.fr/bsv/2022", "bsv_1.pdf"),
            "https://draaf.fr/bsv/bsv_1.pdf"
        );
    }

    #[test]
    fn retryable_errors_are_status_based() {
        assert!(is_retryable(&anyhow::anyhow!("HTTP status client error (429)")));
        assert!(is_retryable(&anyhow::anyhow!("server error 503")));
        assert!(!is_retryable(&anyhow::anyhow!("HTTP 404 Not Found")));
    }
}
