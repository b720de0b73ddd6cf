use crate::error::{RagbenchError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A transcript file discovered under the transcripts directory
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    /// File stem, used as the episode title and source label.
    pub title: String,
    pub absolute_path: PathBuf,
    pub file_size: u64,
}

/// Discover all `.txt` transcripts under `root`, sorted by title.
///
/// Sorting keeps chunk ids and upload order stable between runs.
pub fn discover_transcripts(root: &Path) -> Result<Vec<TranscriptFile>> {
    if !root.is_dir() {
        return Err(RagbenchError::Config(format!(
            "transcripts_dir does not exist or is not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let is_txt = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if !is_txt {
            continue;
        }

        let title = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };

        let metadata = std::fs::metadata(path)?;

        files.push(TranscriptFile {
            title,
            absolute_path: path.to_path_buf(),
            file_size: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.title.cmp(&b.title));

    if files.iter().any(|f| f.file_size == 0) {
        log::warn!("Some transcripts in {} are empty and produce no chunks", root.display());
    }

    log::info!("Discovered {} transcripts in {}", files.len(), root.display());
    Ok(files)
}

/// Combined size of `files`, in bytes.
pub fn total_size(files: &[TranscriptFile]) -> u64 {
    files.iter().map(|f| f.file_size).sum()
}
