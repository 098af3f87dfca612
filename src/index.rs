//! Persistent vector index.
//!
//! Chunks, their metadata, and their embedding vectors live in a single
//! SQLite file (`index.sqlite3`, WAL mode) inside the configured index
//! directory. That file doubles as the index marker: if it exists the
//! index is re-opened without reprocessing documents; if it exists but
//! cannot be read the index is corrupt and startup fails.
//!
//! `add` is all-or-nothing: every chunk in the batch is embedded first,
//! then all rows are inserted in one transaction, so a concurrent
//! `search` observes either the pre-batch or post-batch state, never a
//! partial write. Entry count only decreases via an explicit
//! [`VectorIndex::rebuild`].

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::models::{Chunk, Locus, Retrieved};

/// File that marks a directory as holding an index.
pub const INDEX_MARKER: &str = "index.sqlite3";

#[derive(Debug)]
pub enum IndexError {
    /// The marker file exists but the store cannot be read. Fatal at
    /// startup; the index cannot be operated safely.
    Corrupt(String),
    /// The backing store failed during normal operation.
    Storage(String),
    /// The embedding backend failed; no rows were written.
    Embedding(String),
}

impl Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Corrupt(e) => write!(f, "index is corrupt: {}", e),
            IndexError::Storage(e) => write!(f, "index storage error: {}", e),
            IndexError::Embedding(e) => write!(f, "embedding failed: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

fn storage(e: impl Display) -> IndexError {
    IndexError::Storage(e.to_string())
}

/// Durable mapping from stable chunk identifiers to indexed chunks.
#[derive(Debug)]
pub struct VectorIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl VectorIndex {
    /// Open the index at `dir`, creating an empty one when no marker
    /// file exists. Re-opening an existing index is idempotent.
    pub async fn open_or_create(dir: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir).map_err(storage)?;

        let marker = dir.join(INDEX_MARKER);
        let existed = marker.exists();

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", marker.display()))
            .map_err(storage)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                if existed {
                    IndexError::Corrupt(e.to_string())
                } else {
                    IndexError::Storage(e.to_string())
                }
            })?;

        if existed {
            // The marker was already there: it must be a readable index.
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM indexed_chunks")
                .fetch_one(&pool)
                .await
                .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        } else {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS indexed_chunks (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    text TEXT NOT NULL,
                    source_name TEXT NOT NULL,
                    page INTEGER,
                    sheet TEXT,
                    doc_seq INTEGER NOT NULL,
                    hash TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    model TEXT NOT NULL,
                    dims INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )
                "#,
            )
            .execute(&pool)
            .await
            .map_err(storage)?;
        }

        Ok(Self {
            pool,
            path: dir.to_path_buf(),
        })
    }

    /// Directory this index lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Embed and append a batch of chunks.
    ///
    /// All embeddings are computed before anything is written; an
    /// embedding failure for any chunk commits nothing. Returns the
    /// number of chunks added.
    pub async fn add(
        &self,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<u64, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = embedder
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Embedding(e.to_string()))?;
            vectors.extend(batch_vectors);
        }

        let now = chrono::Utc::now().timestamp();
        let model = embedder.model_name().to_string();
        let dims = embedder.dims() as i64;

        let mut tx = self.pool.begin().await.map_err(storage)?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let (page, sheet) = match &chunk.locus {
                Locus::Whole => (None, None),
                Locus::Page(n) => (Some(*n as i64), None),
                Locus::Sheet(s) => (None, Some(s.clone())),
            };
            sqlx::query(
                r#"
                INSERT INTO indexed_chunks
                    (id, text, source_name, page, sheet, doc_seq, hash, embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&chunk.text)
            .bind(&chunk.source_name)
            .bind(page)
            .bind(&sheet)
            .bind(chunk.seq)
            .bind(hash_text(&chunk.text))
            .bind(vec_to_blob(vector))
            .bind(&model)
            .bind(dims)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;

        Ok(chunks.len() as u64)
    }

    /// Return the `k` chunks most similar to `query` under cosine
    /// similarity, ties broken by insertion order (earlier wins).
    ///
    /// An empty index returns an empty sequence without invoking the
    /// embedder; fewer than `k` entries returns them all.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<Retrieved>, IndexError> {
        if self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Embedding("empty embedding response".to_string()))?;

        let rows = sqlx::query(
            "SELECT seq, text, source_name, page, sheet, doc_seq, embedding FROM indexed_chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut candidates: Vec<(i64, Retrieved)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(&query_vec, &blob_to_vec(&blob));
                let page: Option<i64> = row.get("page");
                let sheet: Option<String> = row.get("sheet");
                let locus = match (page, sheet) {
                    (Some(n), _) => Locus::Page(n as u32),
                    (None, Some(s)) => Locus::Sheet(s),
                    (None, None) => Locus::Whole,
                };
                let chunk = Chunk {
                    text: row.get("text"),
                    source_name: row.get("source_name"),
                    locus,
                    seq: row.get("doc_seq"),
                };
                (row.get::<i64, _>("seq"), Retrieved { chunk, similarity })
            })
            .collect();

        candidates.sort_by(|(seq_a, a), (seq_b, b)| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(seq_a.cmp(seq_b))
        });
        candidates.truncate(k);

        Ok(candidates.into_iter().map(|(_, r)| r).collect())
    }

    /// Total indexed chunk count.
    pub async fn count(&self) -> Result<i64, IndexError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM indexed_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)
    }

    /// Clear all entries. The only path that shrinks the index; used
    /// before full reprocessing so stale chunks do not linger.
    pub async fn rebuild(&self) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM indexed_chunks")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::{ConstantEmbedder, FailingEmbedder, HashEmbedder};

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_name: source.to_string(),
            locus: Locus::Whole,
            seq: 0,
        }
    }

    #[tokio::test]
    async fn open_creates_marker_and_reopens_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();
        assert!(dir.path().join(INDEX_MARKER).exists());
        assert_eq!(index.count().await.unwrap(), 0);

        let embedder = HashEmbedder::new();
        index
            .add(&[chunk("alpha beta", "a.txt")], &embedder, 64)
            .await
            .unwrap();
        index.close().await;

        let reopened = VectorIndex::open_or_create(dir.path()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unreadable_marker_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_MARKER), b"definitely not sqlite").unwrap();
        let err = VectorIndex::open_or_create(dir.path()).await.unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn exact_text_query_returns_that_chunk_first() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();
        let embedder = HashEmbedder::new();

        index
            .add(
                &[
                    chunk("Paris is the capital of France.", "a.txt"),
                    chunk("Rust uses ownership to manage memory safely.", "b.txt"),
                ],
                &embedder,
                64,
            )
            .await
            .unwrap();

        let results = index
            .search("Paris is the capital of France.", 1, &embedder)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source_name, "a.txt");
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn search_returns_fewer_than_k_when_index_is_small() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();
        let embedder = HashEmbedder::new();

        index
            .add(
                &[chunk("one", "a.txt"), chunk("two", "b.txt")],
                &embedder,
                64,
            )
            .await
            .unwrap();

        let results = index.search("one", 10, &embedder).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn empty_index_search_never_touches_the_embedder() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();

        // FailingEmbedder errors on any call; an empty result proves the
        // embedder was never invoked.
        let results = index.search("anything", 4, &FailingEmbedder).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn ties_resolve_to_earlier_insertion() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();
        let embedder = ConstantEmbedder;

        index
            .add(
                &[
                    chunk("first", "a.txt"),
                    chunk("second", "b.txt"),
                    chunk("third", "c.txt"),
                ],
                &embedder,
                64,
            )
            .await
            .unwrap();

        let results = index.search("query", 2, &embedder).await.unwrap();
        assert_eq!(results[0].chunk.text, "first");
        assert_eq!(results[1].chunk.text, "second");
    }

    #[tokio::test]
    async fn failed_embedding_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();

        let err = index
            .add(
                &[chunk("one", "a.txt"), chunk("two", "b.txt")],
                &FailingEmbedder,
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rebuild_clears_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();
        let embedder = HashEmbedder::new();

        index
            .add(
                &[chunk("one", "a.txt"), chunk("two", "b.txt")],
                &embedder,
                64,
            )
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        index.rebuild().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);

        index
            .add(&[chunk("one", "a.txt")], &embedder, 64)
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn page_and_sheet_loci_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open_or_create(dir.path()).await.unwrap();
        let embedder = HashEmbedder::new();

        let mut paged = chunk("page text", "r.pdf");
        paged.locus = Locus::Page(7);
        let mut sheeted = chunk("sheet text", "b.xlsx");
        sheeted.locus = Locus::Sheet("Q1".to_string());

        index.add(&[paged, sheeted], &embedder, 64).await.unwrap();

        let results = index.search("page text", 2, &embedder).await.unwrap();
        let loci: Vec<&Locus> = results.iter().map(|r| &r.chunk.locus).collect();
        assert!(loci.contains(&&Locus::Page(7)));
        assert!(loci.contains(&&Locus::Sheet("Q1".to_string())));
    }
}
