//! Turn a directory of text files into index chunks.
//!
//! Files are split into sentences and greedily packed into chunks of at
//! most [`MAX_CHUNK_CHARS`] characters (a single oversized sentence becomes
//! its own chunk). Chunk ids are `<file stem>_chunk_<n>`.

use crate::error::RetrievalError;
use crate::retrieval::RetrievalStore;

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const MAX_CHUNK_CHARS: usize = 500;

/// Chunks uploaded per store request.
const UPLOAD_BATCH: usize = 64;

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "json", "csv", "log", "yml", "yaml"];

const EXAMPLE_DOCUMENT: &str = "This is an example document for the RAG system. \
Add your documents to the data folder to make them searchable.";

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("sentence pattern is valid"));

/// One indexable piece of a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub indexed_at: String,
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
}

/// Split text into trimmed, non-empty sentences. Terminators are dropped.
fn split_sentences(text: &str) -> Vec<&str> {
    SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Pack sentences into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();
        if current_chars > 0 && current_chars + 1 + sentence_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if current_chars > 0 {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(sentence);
        current_chars += sentence_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn is_supported(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    SUPPORTED_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// Chunks for a single file.
fn chunk_file(path: &Path, extension: &str, content: &str, indexed_at: &str) -> Vec<DocumentChunk> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(&file_name)
        .to_string();
    let file_path = path.display().to_string();

    let pieces = chunk_text(content, MAX_CHUNK_CHARS);
    let total_chunks = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| DocumentChunk {
            id: format!("{stem}_chunk_{chunk_index}"),
            content,
            source: file_path.clone(),
            metadata: ChunkMetadata {
                file_name: file_name.clone(),
                file_path: file_path.clone(),
                file_type: format!(".{extension}"),
                chunk_index,
                total_chunks,
                indexed_at: indexed_at.to_string(),
            },
        })
        .collect()
}

/// Walk `root` and chunk every supported, non-hidden file.
fn collect_chunks(root: &Path) -> Result<(Vec<DocumentChunk>, IndexReport), RetrievalError> {
    if !root.exists() {
        tracing::info!(path = %root.display(), "data directory missing, creating it");
        std::fs::create_dir_all(root)?;
        let example = root.join("example.txt");
        if let Err(error) = std::fs::write(&example, EXAMPLE_DOCUMENT) {
            tracing::warn!(%error, path = %example.display(), "failed to write example document");
        }
    }

    let indexed_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let mut report = IndexReport::default();
    let mut chunks = Vec::new();

    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(%error, "failed to read directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
            continue;
        }

        let path: PathBuf = entry.into_path();
        let Some(extension) = is_supported(&path) else {
            tracing::debug!(path = %path.display(), "skipping unsupported file type");
            report.files_skipped += 1;
            continue;
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let file_chunks = chunk_file(&path, &extension, &content, &indexed_at);
                report.files_indexed += 1;
                report.chunks += file_chunks.len();
                chunks.extend(file_chunks);
            }
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "failed to read document");
                report.files_skipped += 1;
            }
        }
    }

    Ok((chunks, report))
}

/// Chunk every supported file under `root` and upload the chunks to `store`.
///
/// Creates `root` with an example document when it does not exist. Upload
/// failures are counted per batch rather than aborting the run.
pub async fn index_documents(
    store: &dyn RetrievalStore,
    root: &Path,
) -> Result<IndexReport, RetrievalError> {
    let owned_root = root.to_path_buf();
    let (chunks, mut report) = tokio::task::spawn_blocking(move || collect_chunks(&owned_root))
        .await
        .map_err(|error| RetrievalError::Request(format!("indexing task failed: {error}")))??;

    if chunks.is_empty() {
        tracing::info!(path = %root.display(), "no documents found to index");
        return Ok(report);
    }

    for batch in chunks.chunks(UPLOAD_BATCH) {
        if let Err(error) = store.upsert(batch).await {
            tracing::warn!(%error, chunks = batch.len(), "failed to upload document chunks");
            report.failed_chunks += batch.len();
        }
    }

    tracing::info!(
        path = %root.display(),
        files = report.files_indexed,
        chunks = report.chunks,
        failed = report.failed_chunks,
        "document indexing finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{RetrievedDocument, StoreStatus};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        uploaded: Mutex<Vec<DocumentChunk>>,
    }

    #[async_trait]
    impl RetrievalStore for RecordingStore {
        async fn query(
            &self,
            _text: &str,
            _scope: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
            Ok(Vec::new())
        }

        async fn upsert(&self, chunks: &[DocumentChunk]) -> Result<(), RetrievalError> {
            self.uploaded.lock().await.extend_from_slice(chunks);
            Ok(())
        }

        fn status(&self) -> StoreStatus {
            StoreStatus {
                backend: "recording".into(),
                url: String::new(),
                collection: "test".into(),
            }
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("  Just one line.  ", 500), vec!["Just one line.".to_string()]);
        assert!(chunk_text("   ", 500).is_empty());
    }

    #[test]
    fn long_text_is_packed_by_sentence() {
        let text = "Alpha beta gamma. ".repeat(60);
        let chunks = chunk_text(&text, 100);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {chunk}");
            assert!(chunk.starts_with("Alpha"));
        }
    }

    #[test]
    fn sentences_split_on_terminators() {
        assert_eq!(split_sentences("One. Two!  Three?\nFour"), vec!["One", "Two", "Three", "Four"]);
    }

    #[test]
    fn chunk_ids_and_metadata() {
        let path = Path::new("data/notes.md");
        let chunks = chunk_file(path, "md", "Hello there.", "2025-01-01T00:00:00Z");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "notes_chunk_0");
        assert_eq!(chunks[0].metadata.file_name, "notes.md");
        assert_eq!(chunks[0].metadata.file_type, ".md");
        assert_eq!(chunks[0].metadata.total_chunks, 1);
    }

    #[tokio::test]
    async fn indexing_skips_hidden_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("guide.md"), "Install it. Run it.").unwrap();
        std::fs::write(dir.path().join("data.csv"), "a,b\n1,2").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join(".secret.txt"), "hidden").unwrap();

        let store = RecordingStore::default();
        let report = index_documents(&store, dir.path()).await.unwrap();

        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.files_skipped, 1);
        let uploaded = store.uploaded.lock().await;
        let ids: Vec<_> = uploaded.iter().map(|chunk| chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["data_chunk_0", "guide_chunk_0"]);
    }

    #[tokio::test]
    async fn missing_directory_is_created_with_example() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("fresh");

        let store = RecordingStore::default();
        let report = index_documents(&store, &root).await.unwrap();

        assert!(root.join("example.txt").exists());
        assert_eq!(report.files_indexed, 1);
        assert_eq!(store.uploaded.lock().await[0].id, "example_chunk_0");
    }
}
