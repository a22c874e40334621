//! Document loaders and source discovery.
//!
//! Turns raw files into [`SourceDocument`]s:
//!
//! | Extension | Unit | Notes |
//! |-----------|------|-------|
//! | `.pdf` | page | text via `pdf-extract`, pages split on form feed |
//! | `.csv` | row | header skipped, cells joined with `" | "`, rows are atomic |
//! | `.txt`, `.md` | file | UTF-8 required |
//!
//! Discovery walks a domain's source directories, applies include/exclude
//! globs and skips any file whose name was already seen in another
//! directory (the crawler saves the same document under one name).

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DomainConfig;
use crate::error::DocumentLoadError;
use crate::models::SourceDocument;

/// Separator placed between the cells of one CSV row.
pub const CSV_CELL_SEPARATOR: &str = " | ";

/// Load one file into its documents.
pub fn load_document(path: &Path) -> Result<Vec<SourceDocument>, DocumentLoadError> {
    let source_path = path.display().to_string();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let bytes =
                std::fs::read(path).map_err(|e| DocumentLoadError::new(&source_path, e))?;
            load_pdf(&bytes, &source_path)
        }
        "csv" => {
            let text = read_utf8(path, &source_path)?;
            load_csv(&text, &source_path)
        }
        "txt" | "md" => {
            let text = read_utf8(path, &source_path)?;
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![SourceDocument::new(text, source_path)])
        }
        other => Err(DocumentLoadError::new(
            source_path,
            format!("unsupported file type: '{}'", other),
        )),
    }
}

/// Extract PDF text, one document per non-empty page.
pub fn load_pdf(bytes: &[u8], source_path: &str) -> Result<Vec<SourceDocument>, DocumentLoadError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| DocumentLoadError::new(source_path, format!("PDF extraction failed: {}", e)))?;

    Ok(text
        .split('\u{c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .map(|page| SourceDocument::new(page, source_path))
        .collect())
}

/// One atomic document per data row; the header row is skipped.
///
/// Rows may have differing cell counts. A quote only opens a quoted field
/// at the start of a cell; elsewhere it is kept as a literal character.
pub fn load_csv(text: &str, source_path: &str) -> Result<Vec<SourceDocument>, DocumentLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut docs = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DocumentLoadError::new(source_path, e))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cells: Vec<&str> = record.iter().map(str::trim).collect();
        docs.push(SourceDocument::atomic(
            cells.join(CSV_CELL_SEPARATOR),
            source_path,
        ));
    }
    Ok(docs)
}

fn read_utf8(path: &Path, source_path: &str) -> Result<String, DocumentLoadError> {
    let bytes = std::fs::read(path).map_err(|e| DocumentLoadError::new(source_path, e))?;
    String::from_utf8(bytes).map_err(|e| DocumentLoadError::new(source_path, e))
}

/// Files selected for one domain, plus the names skipped as duplicates.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub duplicates: Vec<PathBuf>,
}

/// Walk every source directory of a domain and select the files to ingest.
///
/// Output order is deterministic: sorted by path within each source root,
/// roots in configuration order. A file whose name matches an already
/// selected file is reported in `duplicates` instead.
pub fn discover_sources(domain: &DomainConfig) -> Result<Discovery> {
    let include_set = build_globset(&domain.include_globs)?;
    let exclude_set = build_globset(&domain.exclude_globs)?;

    let mut discovery = Discovery::default();
    let mut seen_names: HashSet<String> = HashSet::new();

    for root in &domain.sources {
        if !root.exists() {
            tracing::warn!(root = %root.display(), "source directory does not exist; skipping");
            continue;
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            paths.push(path.to_path_buf());
        }
        paths.sort();

        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if seen_names.insert(name) {
                discovery.files.push(path);
            } else {
                tracing::info!(path = %path.display(), "skipping duplicate file name");
                discovery.duplicates.push(path);
            }
        }
    }

    Ok(discovery)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_csv_rows_become_atomic_pipe_joined_documents() {
        let text = "question,answer,source\nWhat is flu?,\"A viral, contagious illness\",CDC\n,,\n\"What is \"\"RSV\"\"?\",A virus,NIH\n";
        let docs = load_csv(text, "health.csv").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].text,
            "What is flu? | A viral, contagious illness | CDC"
        );
        assert!(docs[0].atomic);
        assert_eq!(docs[1].text, "What is \"RSV\"? | A virus | NIH");
        assert_eq!(docs[1].source_path, "health.csv");
    }

    #[test]
    fn test_csv_quoted_newline_and_crlf() {
        let text = "a,b\r\n\"line one\nline two\",x\r\n";
        let docs = load_csv(text, "f.csv").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "line one\nline two | x");
    }

    #[test]
    fn test_csv_keeps_empty_cells() {
        let docs = load_csv("a,b,c\n1,,3", "f.csv").unwrap();
        assert_eq!(docs[0].text, "1 |  | 3");
    }

    #[test]
    fn test_csv_quote_inside_cell_stays_on_its_row() {
        let text = "item,size\nTV,55\" screen\nRadio,small\nPhone,6\" display\n";
        let docs = load_csv(text, "catalog.csv").unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].text, "TV | 55\" screen");
        assert_eq!(docs[1].text, "Radio | small");
        assert_eq!(docs[2].text, "Phone | 6\" display");
    }

    #[test]
    fn test_csv_ragged_rows_are_kept() {
        let docs = load_csv("a,b\n1\n2,3,4\n", "f.csv").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "1");
        assert_eq!(docs[1].text, "2 | 3 | 4");
    }

    #[test]
    fn test_invalid_pdf_is_load_error() {
        let err = load_pdf(b"not a pdf", "broken.pdf").unwrap_err();
        assert_eq!(err.path, "broken.pdf");
        assert!(err.reason.contains("PDF"));
    }

    #[test]
    fn test_unsupported_extension_is_load_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("slides.pptx");
        fs::write(&path, b"zip").unwrap();
        assert!(load_document(&path).is_err());
    }

    #[test]
    fn test_text_file_loads_whole() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        fs::write(&path, "# Tort law\n\nNegligence basics.").unwrap();
        let docs = load_document(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("Negligence"));
        assert!(!docs[0].atomic);
    }

    #[test]
    fn test_discovery_dedups_by_file_name() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("act.txt"), "first copy").unwrap();
        fs::write(b.join("act.txt"), "second copy").unwrap();
        fs::write(b.join("rules.txt"), "rules").unwrap();
        fs::write(b.join("image.png"), "png").unwrap();

        let domain = DomainConfig {
            dir: None,
            sources: vec![tmp.path().to_path_buf()],
            include_globs: vec!["**/*.txt".to_string()],
            exclude_globs: vec![],
        };
        let found = discover_sources(&domain).unwrap();
        assert_eq!(found.files.len(), 2);
        assert_eq!(found.duplicates.len(), 1);
        assert!(found.files[0].ends_with("a/act.txt"));
        assert!(found.duplicates[0].ends_with("b/act.txt"));
    }
}
