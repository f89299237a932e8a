/*!
 * Persistent, similarity-aware translation cache.
 *
 * Entries are keyed by the SHA-256 of the raw source text plus the language
 * pair. Lookups come in two flavours:
 * - exact: a single indexed row fetch by hash
 * - fuzzy: exact first, then a length-prefiltered scan of recently used
 *   entries of the same pair, scored by normalized edit distance
 *
 * All writes go through the database's single writer connection. Usage
 * statistics on a hit are refreshed by a detached task so the caller's read
 * path never waits on the writer.
 */

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::database::DatabaseConnection;
use crate::language_utils::LanguagePair;

use super::similarity;

/// Candidates scored per fuzzy lookup
pub const DEFAULT_CANDIDATE_LIMIT: usize = 200;

/// Tokens assumed per cached line for the cost estimate
const ASSUMED_TOKENS_PER_ENTRY: f64 = 30.0;

/// Assumed USD price per token for the cost estimate
const ASSUMED_PRICE_PER_TOKEN: f64 = 0.000_002;

/// A stored translation
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Row id
    pub id: i64,
    /// SHA-256 hex digest of the raw source text
    pub hash: String,
    /// Source text as first stored
    pub source_text: String,
    /// Latest translation
    pub translated_text: String,
    /// Language pair key, e.g. `en:fr`
    pub language_pair: String,
    /// First time this entry was written
    pub created_at: DateTime<Utc>,
    /// Last write or hit
    pub last_used: DateTime<Utc>,
    /// Number of writes and hits
    pub use_count: i64,
}

/// Result of a fuzzy lookup
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    /// Matched entry
    pub entry: CacheEntry,
    /// Similarity between the query and the entry's source text
    pub similarity: f64,
    /// Found through the source hash rather than candidate scoring
    pub exact: bool,
}

impl FuzzyMatch {
    /// Whether the match came from the exact hash lookup
    ///
    /// A scored candidate can reach 1.0 after normalization (case, outer
    /// whitespace) and still not be exact.
    pub fn is_exact(&self) -> bool {
        self.exact
    }
}

/// Aggregate cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of stored entries
    pub total_entries: i64,
    /// Mean use count per entry
    pub average_use_count: f64,
    /// Approximate share of lookups served from cache
    pub hit_rate: f64,
    /// Heuristic estimate of backend spend avoided, in USD
    pub estimated_cost_saved: f64,
    /// Database file size (0 for in-memory stores)
    pub file_size_bytes: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entries: {}, Avg uses: {:.2}, Hit rate: {:.1}%, Est. saved: ${:.4}, Size: {} KB",
            self.total_entries,
            self.average_use_count,
            self.hit_rate * 100.0,
            self.estimated_cost_saved,
            self.file_size_bytes / 1024
        )
    }
}

/// Handle to the translation cache; clones share the same store
#[derive(Clone)]
pub struct TranslationCache {
    db: DatabaseConnection,
    candidate_limit: usize,
    /// Detached usage updates not yet applied
    pending_updates: Arc<AtomicUsize>,
    updates_done: Arc<Notify>,
}

impl TranslationCache {
    /// Create a cache over an existing database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            pending_updates: Arc::new(AtomicUsize::new(0)),
            updates_done: Arc::new(Notify::new()),
        }
    }

    /// Open (or create) a file-backed cache
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new(path)?))
    }

    /// Create an isolated in-memory cache
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    /// Limit how many candidates a fuzzy lookup scores
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(1);
        self
    }

    /// Underlying database
    pub fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Compute SHA256 hash of text
    pub fn hash_text(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a translation by exact source text
    pub async fn exact_lookup(&self, text: &str, pair: &LanguagePair) -> Result<Option<String>> {
        let hash = Self::hash_text(text);
        let pair_key = pair.key();

        let entry = self
            .db
            .read_async(move |conn| fetch_by_hash(conn, &hash, &pair_key))
            .await?;

        match entry {
            Some(entry) => {
                debug!("Cache hit for '{}' ({})", truncate_text(text, 30), pair);
                self.record_hit(entry.id);
                Ok(Some(entry.translated_text))
            }
            None => {
                debug!("Cache miss for '{}' ({})", truncate_text(text, 30), pair);
                Ok(None)
            }
        }
    }

    /// Look up the most similar stored translation at or above `threshold`
    pub async fn fuzzy_lookup(
        &self,
        text: &str,
        pair: &LanguagePair,
        threshold: f64,
    ) -> Result<Option<FuzzyMatch>> {
        let hash = Self::hash_text(text);
        let pair_key = pair.key();
        let query = text.to_string();
        let limit = self.candidate_limit as i64;

        let found = self
            .db
            .read_async(move |conn| {
                if let Some(entry) = fetch_by_hash(conn, &hash, &pair_key)? {
                    return Ok(Some(FuzzyMatch {
                        entry,
                        similarity: 1.0,
                        exact: true,
                    }));
                }

                let (min_len, max_len) = similarity::length_bounds(query.chars().count(), threshold);
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, source_hash, source_text, translated_text, language_pair,
                           created_at, last_used, use_count
                    FROM translation_cache
                    WHERE language_pair = ?1
                      AND source_length BETWEEN ?2 AND ?3
                    ORDER BY last_used DESC
                    LIMIT ?4
                    "#,
                )?;
                let candidates = stmt
                    .query_map(params![pair_key, min_len, max_len, limit], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let normalized_query = similarity::normalize(&query);
                let mut best: Option<FuzzyMatch> = None;
                for candidate in candidates {
                    let score = similarity::similarity_normalized(
                        &normalized_query,
                        &similarity::normalize(&candidate.source_text),
                    );
                    if score < threshold {
                        continue;
                    }
                    if best.as_ref().is_none_or(|b| score > b.similarity) {
                        best = Some(FuzzyMatch {
                            entry: candidate,
                            similarity: score,
                            exact: false,
                        });
                    }
                }
                Ok(best)
            })
            .await?;

        if let Some(found) = &found {
            debug!(
                "Fuzzy cache hit for '{}' ({:.3} similar to '{}')",
                truncate_text(text, 30),
                found.similarity,
                truncate_text(&found.entry.source_text, 30)
            );
            self.record_hit(found.entry.id);
        }

        Ok(found)
    }

    /// Fetch the stored entry for `text` without touching its usage stats
    pub async fn get_entry(&self, text: &str, pair: &LanguagePair) -> Result<Option<CacheEntry>> {
        let hash = Self::hash_text(text);
        let pair_key = pair.key();
        self.db
            .read_async(move |conn| fetch_by_hash(conn, &hash, &pair_key))
            .await
    }

    /// Store one translation, overwriting and bumping usage on conflict
    pub async fn save(&self, text: &str, translation: &str, pair: &LanguagePair) -> Result<()> {
        let row = PendingRow::new(text, translation, pair);

        self.db
            .write_async(move |conn| {
                upsert(conn, &row)?;
                Ok(())
            })
            .await?;

        debug!("Cached translation for '{}' ({})", truncate_text(text, 30), pair);
        Ok(())
    }

    /// Store many translations in one transaction; nothing is written on failure
    pub async fn save_batch(&self, pair: &LanguagePair, entries: &[(String, String)]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let rows: Vec<PendingRow> = entries
            .iter()
            .map(|(source, translation)| PendingRow::new(source, translation, pair))
            .collect();
        let count = rows.len();

        self.db
            .transaction_async(move |tx| {
                for row in &rows {
                    upsert(tx, row)?;
                }
                Ok(())
            })
            .await?;

        debug!("Cached {} translations ({})", count, pair);
        Ok(count)
    }

    /// Aggregate statistics over the whole store
    pub async fn stats(&self) -> Result<CacheStats> {
        let (total_entries, average_use_count): (i64, f64) = self
            .db
            .read_async(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), COALESCE(AVG(use_count), 0.0) FROM translation_cache",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await?;

        let hit_rate = if average_use_count > 0.0 {
            (average_use_count - 1.0) / average_use_count
        } else {
            0.0
        };

        Ok(CacheStats {
            total_entries,
            average_use_count,
            hit_rate,
            estimated_cost_saved: total_entries as f64
                * ASSUMED_TOKENS_PER_ENTRY
                * ASSUMED_PRICE_PER_TOKEN
                * hit_rate,
            file_size_bytes: self.db.file_size(),
        })
    }

    /// Number of stored entries
    pub async fn len(&self) -> Result<i64> {
        self.db
            .read_async(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM translation_cache", [], |row| row.get(0))?))
            .await
    }

    /// Delete every entry and compact the store
    pub async fn purge(&self) -> Result<usize> {
        let deleted = self
            .db
            .write_async(|conn| Ok(conn.execute("DELETE FROM translation_cache", [])?))
            .await?;
        self.db.vacuum_async().await?;

        debug!("Translation cache purged ({} entries)", deleted);
        Ok(deleted)
    }

    /// Delete entries not used within `age` and compact the store
    pub async fn purge_older_than(&self, age: chrono::Duration) -> Result<usize> {
        let cutoff = (Utc::now() - age).timestamp_millis();
        let deleted = self
            .db
            .write_async(move |conn| {
                Ok(conn.execute("DELETE FROM translation_cache WHERE last_used < ?1", [cutoff])?)
            })
            .await?;
        self.db.vacuum_async().await?;

        debug!("Purged {} cache entries unused since {}", deleted, cutoff);
        Ok(deleted)
    }

    /// Wait until all detached usage updates have been applied
    pub async fn wait_for_usage_updates(&self) {
        loop {
            let notified = self.updates_done.notified();
            if self.pending_updates.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Refresh `use_count` and `last_used` for a hit without blocking the caller
    fn record_hit(&self, id: i64) {
        let db = self.db.clone();
        let pending = self.pending_updates.clone();
        let done = self.updates_done.clone();
        pending.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let now = Utc::now().timestamp_millis();
            let result = db
                .write_async(move |conn| {
                    conn.execute(
                        "UPDATE translation_cache SET use_count = use_count + 1, last_used = ?1 WHERE id = ?2",
                        params![now, id],
                    )?;
                    Ok(())
                })
                .await;
            if let Err(e) = result {
                debug!("Failed to record cache hit for entry {}: {}", id, e);
            }
            pending.fetch_sub(1, Ordering::SeqCst);
            done.notify_waiters();
        });
    }
}

/// A row about to be upserted
struct PendingRow {
    hash: String,
    source_text: String,
    translated_text: String,
    language_pair: String,
    source_length: i64,
    now: i64,
}

impl PendingRow {
    fn new(source: &str, translation: &str, pair: &LanguagePair) -> Self {
        Self {
            hash: TranslationCache::hash_text(source),
            source_text: source.to_string(),
            translated_text: translation.to_string(),
            language_pair: pair.key(),
            source_length: source.chars().count() as i64,
            now: Utc::now().timestamp_millis(),
        }
    }
}

fn upsert(conn: &Connection, row: &PendingRow) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        INSERT INTO translation_cache (
            source_hash, source_text, translated_text, language_pair,
            source_length, created_at, last_used, use_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1)
        ON CONFLICT(source_hash, language_pair) DO UPDATE SET
            translated_text = excluded.translated_text,
            use_count = translation_cache.use_count + 1,
            last_used = excluded.last_used
        "#,
        params![
            row.hash,
            row.source_text,
            row.translated_text,
            row.language_pair,
            row.source_length,
            row.now,
        ],
    )
}

fn fetch_by_hash(conn: &Connection, hash: &str, pair_key: &str) -> Result<Option<CacheEntry>> {
    let entry = conn
        .query_row(
            r#"
            SELECT id, source_hash, source_text, translated_text, language_pair,
                   created_at, last_used, use_count
            FROM translation_cache
            WHERE source_hash = ?1 AND language_pair = ?2
            "#,
            params![hash, pair_key],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        id: row.get(0)?,
        hash: row.get(1)?,
        source_text: row.get(2)?,
        translated_text: row.get(3)?,
        language_pair: row.get(4)?,
        created_at: millis_to_datetime(row.get(5)?),
        last_used: millis_to_datetime(row.get(6)?),
        use_count: row.get(7)?,
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Truncate text to a maximum number of chars with ellipsis
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
