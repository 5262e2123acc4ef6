use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::segment::StructuredDocument;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS bulletins (
            id         INTEGER PRIMARY KEY,
            region     TEXT NOT NULL,
            year       INTEGER NOT NULL,
            url        TEXT UNIQUE NOT NULL,
            file_name  TEXT NOT NULL,
            fetched    BOOLEAN NOT NULL DEFAULT 0,
            fetched_at TEXT,
            error      TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_bulletins_fetched ON bulletins(fetched);
        CREATE INDEX IF NOT EXISTS idx_bulletins_year ON bulletins(region, year);

        CREATE TABLE IF NOT EXISTS documents (
            id            INTEGER PRIMARY KEY,
            bulletin_id   INTEGER UNIQUE NOT NULL REFERENCES bulletins(id),
            raw_text      TEXT NOT NULL,
            cleaned_text  TEXT,
            reduction_pct REAL,
            extracted_at  TEXT NOT NULL DEFAULT (datetime('now')),
            cleaned_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS structures (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER UNIQUE NOT NULL REFERENCES documents(id),
            json        TEXT NOT NULL,
            crop_count  INTEGER NOT NULL,
            block_count INTEGER NOT NULL,
            parsed_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Flattened view of the structured output, one row per content block.
        CREATE TABLE IF NOT EXISTS sections (
            id          INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL REFERENCES documents(id),
            crop        TEXT NOT NULL,
            topic       TEXT NOT NULL,
            position    INTEGER NOT NULL,
            content     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sections_crop ON sections(crop);
        CREATE INDEX IF NOT EXISTS idx_sections_document ON sections(document_id);
        ",
    )?;
    Ok(())
}

// ── Fetching ──

pub struct NewBulletin {
    pub region: String,
    pub year: i32,
    pub url: String,
    pub file_name: String,
}

pub fn insert_bulletins(conn: &Connection, bulletins: &[NewBulletin]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO bulletins (region, year, url, file_name) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for b in bulletins {
            count += stmt.execute(rusqlite::params![b.region, b.year, b.url, b.file_name])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct BulletinRef {
    pub id: i64,
    pub region: String,
    pub year: i32,
    pub url: String,
    pub file_name: String,
}

fn query_bulletins(conn: &Connection, sql: &str) -> Result<Vec<BulletinRef>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(BulletinRef {
                id: row.get(0)?,
                region: row.get(1)?,
                year: row.get(2)?,
                url: row.get(3)?,
                file_name: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_unfetched(conn: &Connection, limit: Option<usize>) -> Result<Vec<BulletinRef>> {
    query_bulletins(
        conn,
        &with_limit(
            "SELECT id, region, year, url, file_name FROM bulletins WHERE fetched = 0 ORDER BY id",
            limit,
        ),
    )
}

/// Result of one PDF download, streamed back to the main loop.
pub struct FetchRow {
    pub bulletin_id: i64,
    pub error: Option<String>,
}

pub const MARK_FETCHED_SQL: &str =
    "UPDATE bulletins SET fetched = ?1, fetched_at = ?2, error = ?3 WHERE id = ?4";

pub fn mark_fetched(update: &mut rusqlite::Statement, row: &FetchRow) -> Result<()> {
    update.execute(rusqlite::params![
        row.error.is_none(),
        chrono::Utc::now().to_rfc3339(),
        row.error,
        row.bulletin_id,
    ])?;
    Ok(())
}

// ── Extraction ──

pub fn fetch_unextracted(conn: &Connection, limit: Option<usize>) -> Result<Vec<BulletinRef>> {
    query_bulletins(
        conn,
        &with_limit(
            "SELECT b.id, b.region, b.year, b.url, b.file_name
             FROM bulletins b LEFT JOIN documents d ON d.bulletin_id = b.id
             WHERE b.fetched = 1 AND b.error IS NULL AND d.id IS NULL
             ORDER BY b.id",
            limit,
        ),
    )
}

pub fn insert_document(conn: &Connection, bulletin_id: i64, raw_text: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO documents (bulletin_id, raw_text) VALUES (?1, ?2)",
        rusqlite::params![bulletin_id, raw_text],
    )?;
    Ok(())
}

// ── Cleaning ──

pub struct RawDocument {
    pub id: i64,
    pub raw_text: String,
}

pub fn fetch_uncleaned(conn: &Connection, limit: Option<usize>) -> Result<Vec<RawDocument>> {
    let sql = with_limit(
        "SELECT id, raw_text FROM documents WHERE cleaned_text IS NULL ORDER BY id",
        limit,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RawDocument {
                id: row.get(0)?,
                raw_text: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_cleaned(conn: &Connection, id: i64, cleaned: &str, reduction_pct: f64) -> Result<()> {
    conn.execute(
        "UPDATE documents SET cleaned_text = ?1, reduction_pct = ?2, cleaned_at = datetime('now')
         WHERE id = ?3",
        rusqlite::params![cleaned, reduction_pct, id],
    )?;
    Ok(())
}

// ── Parsing ──

pub struct CleanDocument {
    pub id: i64,
    pub file_name: String,
    pub region: String,
    pub year: i32,
    pub cleaned_text: String,
}

pub fn fetch_unparsed(conn: &Connection, limit: Option<usize>) -> Result<Vec<CleanDocument>> {
    let sql = with_limit(
        "SELECT d.id, b.file_name, b.region, b.year, d.cleaned_text
         FROM documents d
         JOIN bulletins b ON b.id = d.bulletin_id
         LEFT JOIN structures s ON s.document_id = d.id
         WHERE d.cleaned_text IS NOT NULL AND s.id IS NULL
         ORDER BY d.id",
        limit,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CleanDocument {
                id: row.get(0)?,
                file_name: row.get(1)?,
                region: row.get(2)?,
                year: row.get(3)?,
                cleaned_text: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct StructureRow {
    pub document_id: i64,
    pub document: StructuredDocument,
}

pub fn save_structures(conn: &Connection, rows: &[StructureRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut insert_structure = tx.prepare(
            "INSERT OR REPLACE INTO structures (document_id, json, crop_count, block_count)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut delete_sections = tx.prepare("DELETE FROM sections WHERE document_id = ?1")?;
        let mut insert_section = tx.prepare(
            "INSERT INTO sections (document_id, crop, topic, position, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for r in rows {
            let json = serde_json::to_string(&r.document)?;
            let block_count: usize =
                r.document.values().flat_map(|t| t.values()).map(Vec::len).sum();
            insert_structure.execute(rusqlite::params![
                r.document_id,
                json,
                r.document.len(),
                block_count,
            ])?;
            delete_sections.execute(rusqlite::params![r.document_id])?;
            let mut position = 0;
            for (crop, topics) in &r.document {
                for (topic, blocks) in topics {
                    for content in blocks {
                        insert_section.execute(rusqlite::params![
                            r.document_id,
                            crop,
                            topic,
                            position,
                            content,
                        ])?;
                        position += 1;
                    }
                }
            }
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Reporting ──

pub struct Stats {
    pub bulletins: i64,
    pub fetched: i64,
    pub errors: i64,
    pub extracted: i64,
    pub cleaned: i64,
    pub parsed: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let one = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };
    Ok(Stats {
        bulletins: one("SELECT COUNT(*) FROM bulletins")?,
        fetched: one("SELECT COUNT(*) FROM bulletins WHERE fetched = 1 AND error IS NULL")?,
        errors: one("SELECT COUNT(*) FROM bulletins WHERE error IS NOT NULL")?,
        extracted: one("SELECT COUNT(*) FROM documents")?,
        cleaned: one("SELECT COUNT(*) FROM documents WHERE cleaned_text IS NOT NULL")?,
        parsed: one("SELECT COUNT(*) FROM structures")?,
    })
}

pub struct CropOverviewRow {
    pub crop: String,
    pub documents: i64,
    pub topics: i64,
    pub blocks: i64,
}

/// Per-crop totals across all parsed bulletins, most covered crop first.
pub fn fetch_crop_overview(conn: &Connection, limit: usize) -> Result<Vec<CropOverviewRow>> {
    let mut stmt = conn.prepare(
        "SELECT crop,
                COUNT(DISTINCT document_id),
                COUNT(DISTINCT topic),
                COUNT(*)
         FROM sections
         GROUP BY crop
         ORDER BY COUNT(*) DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(CropOverviewRow {
                crop: row.get(0)?,
                documents: row.get(1)?,
                topics: row.get(2)?,
                blocks: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn with_limit(sql: &str, limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!("{} LIMIT {}", sql, n),
        None => sql.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn seed_bulletin(conn: &Connection) -> i64 {
        insert_bulletins(
            conn,
            &[NewBulletin {
                region: "bourgogne_franche_comte".to_string(),
                year: 2022,
                url: "https://example.org/bsv_1.pdf".to_string(),
                file_name: "bsv_1.pdf".to_string(),
            }],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn bulletin_insert_is_idempotent_on_url() {
        let conn = test_conn();
        seed_bulletin(&conn);
        let again = insert_bulletins(
            &conn,
            &[NewBulletin {
                region: "bourgogne_franche_comte".to_string(),
                year: 2022,
                url: "https://example.org/bsv_1.pdf".to_string(),
                file_name: "bsv_1.pdf".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(again, 0);
        assert_eq!(fetch_unfetched(&conn, None).unwrap().len(), 1);
    }

    #[test]
    fn pipeline_state_advances() {
        let conn = test_conn();
        let id = seed_bulletin(&conn);

        let mut update = conn.prepare(MARK_FETCHED_SQL).unwrap();
        mark_fetched(
            &mut update,
            &FetchRow {
                bulletin_id: id,
                error: None,
            },
        )
        .unwrap();
        drop(update);
        assert!(fetch_unfetched(&conn, None).unwrap().is_empty());

        let todo = fetch_unextracted(&conn, None).unwrap();
        assert_eq!(todo.len(), 1);
        insert_document(&conn, id, "Colza :\nbrut").unwrap();
        assert!(fetch_unextracted(&conn, None).unwrap().is_empty());

        let docs = fetch_uncleaned(&conn, None).unwrap();
        assert_eq!(docs.len(), 1);
        save_cleaned(&conn, docs[0].id, "Colza :\npropre", 12.5).unwrap();
        assert!(fetch_uncleaned(&conn, None).unwrap().is_empty());

        let unparsed = fetch_unparsed(&conn, None).unwrap();
        assert_eq!(unparsed.len(), 1);
        assert_eq!(unparsed[0].cleaned_text, "Colza :\npropre");
    }

    #[test]
    fn structures_flatten_into_sections() {
        let conn = test_conn();
        let id = seed_bulletin(&conn);
        insert_document(&conn, id, "brut").unwrap();
        let doc_id = conn.last_insert_rowid();
        save_cleaned(&conn, doc_id, "propre", 0.0).unwrap();

        let mut structured = StructuredDocument::new();
        let mut topics = IndexMap::new();
        topics.insert("General".to_string(), vec!["un".to_string(), "deux".to_string()]);
        topics.insert("ANALYSE_RISQUE".to_string(), vec!["faible".to_string()]);
        structured.insert("COLZA".to_string(), topics);

        save_structures(
            &conn,
            &[StructureRow {
                document_id: doc_id,
                document: structured,
            }],
        )
        .unwrap();

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.parsed, 1);
        let overview = fetch_crop_overview(&conn, 10).unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].crop, "COLZA");
        assert_eq!(overview[0].blocks, 3);
        assert_eq!(overview[0].topics, 2);
    }

    #[test]
    fn fetch_errors_block_extraction() {
        let conn = test_conn();
        let id = seed_bulletin(&conn);
        let mut update = conn.prepare(MARK_FETCHED_SQL).unwrap();
        mark_fetched(
            &mut update,
            &FetchRow {
                bulletin_id: id,
                error: Some("HTTP 404".to_string()),
            },
        )
        .unwrap();
        drop(update);
        assert!(fetch_unextracted(&conn, None).unwrap().is_empty());
        assert_eq!(get_stats(&conn).unwrap().errors, 1);
    }
}
