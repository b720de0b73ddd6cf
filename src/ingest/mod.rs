//! Transcript corpus preparation: discovery, chunking, and per-backend layout.

pub mod chunker;
pub mod walker;

pub use chunker::{chunk_words, estimate_tokens, split_by_lines};
pub use walker::{discover_transcripts, total_size, TranscriptFile};

use crate::backends::BackendKind;
use crate::config::ChunkingConfig;
use crate::error::Result;
use sha2::{Digest, Sha256};

/// A unit of text uploaded to a backend: a whole transcript or one chunk of it
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusDocument {
    /// Stable id derived from title and chunk index.
    pub id: String,
    /// Episode title; reported back as the passage source.
    pub title: String,
    pub text: String,
}

impl CorpusDocument {
    pub fn new(title: &str, index: usize, text: String) -> Self {
        Self {
            id: document_id(title, index),
            title: title.to_string(),
            text,
        }
    }
}

/// SHA256 hex of `{title}#{index}`. Hex keeps the id valid for every backend's
/// key alphabet, and re-uploads overwrite instead of duplicating.
pub fn document_id(title: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"#");
    hasher.update(index.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Shape one transcript the way `kind` indexes it.
///
/// - vector index: overlapping token windows (embedded per chunk)
/// - semantic filter: the whole transcript (the service chunks server-side)
/// - cloud search: line-budget chunks with a title header
pub fn layout_transcript(
    kind: BackendKind,
    title: &str,
    text: &str,
    chunking: &ChunkingConfig,
) -> Vec<CorpusDocument> {
    let pieces = match kind {
        BackendKind::VectorIndex => chunk_words(
            text,
            chunking.window_tokens,
            chunking.window_overlap_tokens,
        ),
        BackendKind::SemanticFilter => {
            if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            }
        }
        BackendKind::CloudSearch => split_by_lines(title, text, chunking.line_chunk_chars),
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(idx, piece)| CorpusDocument::new(title, idx, piece))
        .collect()
}

/// Read every transcript under `root` and lay it out for `kind`.
pub fn prepare_corpus(
    kind: BackendKind,
    root: &std::path::Path,
    chunking: &ChunkingConfig,
) -> Result<Vec<CorpusDocument>> {
    let files = discover_transcripts(root)?;
    let mut corpus = Vec::new();

    for file in &files {
        let text = std::fs::read_to_string(&file.absolute_path)?;
        let docs = layout_transcript(kind, &file.title, &text, chunking);
        log::debug!("{}: {} documents for {}", file.title, docs.len(), kind);
        corpus.extend(docs);
    }

    log::info!(
        "Prepared {} documents from {} transcripts for {}",
        corpus.len(),
        files.len(),
        kind
    );
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn transcript() -> String {
        (0..40)
            .map(|i| format!("Ben: line {} about Whole Foods and Zappos.\n", i))
            .collect()
    }

    #[test]
    fn test_document_id_is_stable_and_distinct() {
        assert_eq!(document_id("Amazon", 0), document_id("Amazon", 0));
        assert_ne!(document_id("Amazon", 0), document_id("Amazon", 1));
        assert_eq!(document_id("Amazon", 0).len(), 64);
        assert!(document_id("Amazon", 0).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_layout_semantic_filter_is_whole_transcript() {
        let text = transcript();
        let docs = layout_transcript(
            BackendKind::SemanticFilter,
            "Amazon",
            &text,
            &ChunkingConfig::default(),
        );
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, text);
        assert_eq!(docs[0].title, "Amazon");
    }

    #[test]
    fn test_layout_cloud_search_has_title_headers() {
        let docs = layout_transcript(
            BackendKind::CloudSearch,
            "Amazon",
            &transcript(),
            &ChunkingConfig::default(),
        );
        assert!(docs.len() > 1);
        assert!(docs.iter().all(|d| d.text.starts_with("Title: Amazon\n")));
    }

    #[test]
    fn test_layout_vector_index_windows() {
        let chunking = ChunkingConfig {
            line_chunk_chars: 900,
            window_tokens: 40,
            window_overlap_tokens: 8,
        };
        let docs = layout_transcript(BackendKind::VectorIndex, "Amazon", &transcript(), &chunking);
        assert!(docs.len() > 1);
        let ids: std::collections::HashSet<_> = docs.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids.len(), docs.len());
    }

    #[test]
    fn test_prepare_corpus() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("Amazon.txt"), transcript()).unwrap();
        fs::write(temp_dir.path().join("Empty.txt"), "").unwrap();

        let corpus = prepare_corpus(
            BackendKind::SemanticFilter,
            temp_dir.path(),
            &ChunkingConfig::default(),
        )
        .unwrap();

        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].title, "Amazon");
    }
}
