//! Reading and writing the extracted-text corpus.
//!
//! The interchange format is a single JSON object mapping a document
//! identifier (normally the path of the source file) to its extracted text.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Corpus;

/// Load a `{ "<id>": "<text>" }` JSON file.
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::InvalidCorpus(format!("cannot read {}: {e}", path.display())))?;
    let corpus: Corpus = serde_json::from_str(&raw).map_err(|e| {
        Error::InvalidCorpus(format!("{} is not a JSON object of strings: {e}", path.display()))
    })?;
    info!(path = %path.display(), documents = corpus.len(), "loaded corpus");
    Ok(corpus)
}

/// Write a corpus as pretty-printed UTF-8 JSON, creating parent directories.
pub fn save_corpus(path: &Path, corpus: &Corpus) -> Result<()> {
    let io_err = |e: std::io::Error| Error::InvalidCorpus(format!("cannot write {}: {e}", path.display()));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(corpus).map_err(|e| Error::InvalidCorpus(e.to_string()))?;
    fs::write(path, json).map_err(io_err)?;
    info!(path = %path.display(), documents = corpus.len(), "saved corpus");
    Ok(())
}

/// Build a corpus from every `.txt` file under `root`, keyed by file path.
/// Files that are empty after trimming are skipped.
pub fn corpus_from_dir(root: &Path) -> Result<Corpus> {
    if !root.is_dir() {
        return Err(Error::InvalidCorpus(format!("not a directory: {}", root.display())));
    }
    let mut corpus = Corpus::new();
    for path in list_txt_files(root) {
        let text = read_file_content(&path)?;
        if text.trim().is_empty() {
            warn!(path = %path.display(), "no text extracted, skipping");
            continue;
        }
        debug!(path = %path.display(), chars = text.chars().count(), "read document");
        corpus.insert(path.to_string_lossy().into_owned(), text);
    }
    info!(root = %root.display(), documents = corpus.len(), "collected text files");
    Ok(corpus)
}

fn read_file_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => fs::read(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| Error::InvalidCorpus(format!("cannot read {}: {e}", path.display()))),
    }
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    txt_files.sort();
    txt_files
}
