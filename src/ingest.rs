//! Document ingestion.
//!
//! Walks the documents directory, loads each supported file, chunks
//! the extracted text, and indexes everything in one atomic batch.
//! A file that fails to load is reported and skipped; it never aborts
//! the run. Unsupported extensions are skipped without counting as
//! failures.

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::chunk::split_documents;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::extract::{is_supported, load_file};
use crate::index::VectorIndex;
use crate::models::{Chunk, IngestStats};

/// Ingest every supported file under the configured documents
/// directory, appending to the index.
pub async fn process_all(
    config: &Config,
    index: &VectorIndex,
    embedder: &dyn Embedder,
) -> Result<IngestStats> {
    let docs_dir = &config.paths.documents;
    if !docs_dir.exists() {
        std::fs::create_dir_all(docs_dir)
            .with_context(|| format!("Failed to create documents dir: {}", docs_dir.display()))?;
    }

    let mut stats = IngestStats::default();
    let mut chunks: Vec<Chunk> = Vec::new();

    for entry in WalkDir::new(docs_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !is_supported(&ext) {
            println!("  Skipping (unsupported type): {}", path.display());
            continue;
        }

        match load_file(path) {
            Ok(documents) => {
                let file_chunks = split_documents(
                    &documents,
                    config.chunking.chunk_size,
                    config.chunking.overlap,
                );
                println!(
                    "  Loaded {} ({} chunks)",
                    path.display(),
                    file_chunks.len()
                );
                chunks.extend(file_chunks);
                stats.files_processed += 1;
            }
            Err(e) => {
                eprintln!("  Failed to load {}: {}", path.display(), e);
                stats.files_failed += 1;
            }
        }
    }

    if !chunks.is_empty() {
        stats.total_chunks = index
            .add(&chunks, embedder, config.ollama.batch_size)
            .await
            .context("Failed to index document chunks")?;
    }

    println!(
        "Processed {} files ({} failed), {} chunks indexed",
        stats.files_processed, stats.files_failed, stats.total_chunks
    );

    Ok(stats)
}

/// Clear the index and ingest everything from scratch. Running this
/// twice over an unchanged directory yields the same index size.
pub async fn reprocess_all(
    config: &Config,
    index: &VectorIndex,
    embedder: &dyn Embedder,
) -> Result<IngestStats> {
    index.rebuild().await.context("Failed to clear the index")?;
    process_all(config, index, embedder).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::HashEmbedder;

    fn test_config(docs: &std::path::Path, index_dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.documents = docs.to_path_buf();
        config.paths.index = index_dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn ingests_text_files_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("notes.txt"), "Paris is the capital of France.").unwrap();
        std::fs::write(docs.join("broken.pdf"), b"not a real pdf").unwrap();
        std::fs::write(docs.join("readme.md"), "unsupported").unwrap();

        let index_dir = dir.path().join("index");
        let index = VectorIndex::open_or_create(&index_dir).await.unwrap();
        let embedder = HashEmbedder::new();
        let config = test_config(&docs, &index_dir);

        let stats = process_all(&config, &index, &embedder).await.unwrap();

        assert_eq!(stats.files_processed, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_documents_directory_yields_empty_stats() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        let index_dir = dir.path().join("index");
        let index = VectorIndex::open_or_create(&index_dir).await.unwrap();
        let embedder = HashEmbedder::new();
        let config = test_config(&docs, &index_dir);

        let stats = process_all(&config, &index, &embedder).await.unwrap();

        assert_eq!(stats.files_processed, 0);
        assert_eq!(stats.total_chunks, 0);
        // The directory is created so later runs have a place to scan.
        assert!(docs.exists());
    }

    #[tokio::test]
    async fn reprocessing_does_not_accumulate_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "alpha beta gamma").unwrap();
        std::fs::write(docs.join("b.txt"), "delta epsilon").unwrap();

        let index_dir = dir.path().join("index");
        let index = VectorIndex::open_or_create(&index_dir).await.unwrap();
        let embedder = HashEmbedder::new();
        let config = test_config(&docs, &index_dir);

        let first = reprocess_all(&config, &index, &embedder).await.unwrap();
        let second = reprocess_all(&config, &index, &embedder).await.unwrap();

        assert_eq!(first.total_chunks, second.total_chunks);
        assert_eq!(index.count().await.unwrap(), second.total_chunks as i64);
    }

    #[tokio::test]
    async fn nested_directories_are_walked() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(docs.join("sub/deeper")).unwrap();
        std::fs::write(docs.join("top.txt"), "top level").unwrap();
        std::fs::write(docs.join("sub/deeper/nested.txt"), "nested file").unwrap();

        let index_dir = dir.path().join("index");
        let index = VectorIndex::open_or_create(&index_dir).await.unwrap();
        let embedder = HashEmbedder::new();
        let config = test_config(&docs, &index_dir);

        let stats = process_all(&config, &index, &embedder).await.unwrap();
        assert_eq!(stats.files_processed, 2);
    }
}
