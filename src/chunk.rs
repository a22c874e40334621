//! Boundary-aware, overlapping text chunker.
//!
//! Splits document text into chunks of at most `max_size` characters.
//! Each cut is placed on the largest natural boundary available inside the
//! window, in order: paragraph, line, sentence, clause, word. A hard
//! character cut is used only when the window contains none of them. Every
//! chunk after the first starts `overlap` characters before the previous
//! chunk's end.
//!
//! Lengths are counted in `char`s, not bytes, so multi-byte text is never
//! split inside a code point.

use sha2::{Digest, Sha256};

use crate::error::ChunkConfigError;
use crate::models::{DocumentChunk, SourceDocument};

/// Boundaries in preference order. A cut is placed right after the separator.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "; ", ", ", " "];

/// Split `text` into overlapping chunks of at most `max_size` characters.
///
/// Returns an empty vector for empty or whitespace-only input.
pub fn split(
    text: &str,
    max_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkConfigError> {
    if max_size == 0 || overlap >= max_size {
        return Err(ChunkConfigError { max_size, overlap });
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = start + max_size;
        if window_end >= chars.len() {
            push_trimmed(&mut chunks, &chars[start..]);
            break;
        }

        // The cut must land past `start + overlap` so the next window moves forward.
        let cut = find_cut(&chars, start + overlap, window_end);
        push_trimmed(&mut chunks, &chars[start..cut]);
        start = cut - overlap;
    }

    Ok(chunks)
}

/// Chunk one loaded document. Atomic documents (CSV rows) are kept whole.
pub fn split_document(
    doc: &SourceDocument,
    max_size: usize,
    overlap: usize,
) -> Result<Vec<DocumentChunk>, ChunkConfigError> {
    let texts = if doc.atomic {
        if max_size == 0 || overlap >= max_size {
            return Err(ChunkConfigError { max_size, overlap });
        }
        let trimmed = doc.text.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    } else {
        split(&doc.text, max_size, overlap)?
    };

    Ok(texts
        .into_iter()
        .map(|text| DocumentChunk {
            text,
            source_path: doc.source_path.clone(),
        })
        .collect())
}

/// SHA-256 of the chunk text, used to drop exact duplicates at index time.
pub fn chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Latest boundary of the highest-ranked separator with `min_cut < cut <= end`.
fn find_cut(chars: &[char], min_cut: usize, end: usize) -> usize {
    for sep in SEPARATORS {
        let sep: Vec<char> = sep.chars().collect();
        let mut cut = end;
        while cut > min_cut && cut >= sep.len() {
            if chars[cut - sep.len()..cut] == sep[..] {
                return cut;
            }
            cut -= 1;
        }
    }
    end
}

fn push_trimmed(chunks: &mut Vec<String>, piece: &[char]) {
    let text: String = piece.iter().collect();
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split("Hello, world!", 100, 10).unwrap();
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(split("", 100, 10).unwrap().is_empty());
        assert!(split("   \n\n  ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(split("abc", 0, 0).is_err());
        assert!(split("abc", 10, 10).is_err());
        assert!(split("abc", 10, 11).is_err());
        assert!(split("abc", 10, 9).is_ok());
    }

    #[test]
    fn test_every_chunk_within_limit() {
        let text = format!(
            "{}\n\n{}. {}\n{}",
            words(120),
            words(40),
            "x".repeat(333),
            words(75)
        );
        for (max, overlap) in [(50, 0), (50, 10), (64, 63), (200, 40), (1000, 200)] {
            let chunks = split(&text, max, overlap).unwrap();
            assert!(!chunks.is_empty());
            for c in &chunks {
                assert!(
                    c.chars().count() <= max,
                    "chunk of {} chars exceeds {}",
                    c.chars().count(),
                    max
                );
            }
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "First paragraph here.\n\nSecond paragraph is here.";
        let chunks = split(text, 30, 0).unwrap();
        assert_eq!(chunks[0], "First paragraph here.");
        assert_eq!(chunks[1], "Second paragraph is here.");
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        let text = "One two three. Four five six seven eight";
        let chunks = split(text, 25, 0).unwrap();
        assert_eq!(chunks[0], "One two three.");
    }

    #[test]
    fn test_hard_split_without_boundaries() {
        let text = "a".repeat(25);
        let chunks = split(&text, 10, 0).unwrap();
        assert_eq!(chunks, vec!["a".repeat(10), "a".repeat(10), "a".repeat(5)]);
    }

    #[test]
    fn test_overlap_carries_previous_tail() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = split(text, 10, 3).unwrap();
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        assert!(chunks[1].starts_with(&chunks[0][7..]));
        assert_eq!(chunks.last().unwrap(), "vwxyz");
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "é".repeat(30);
        let chunks = split(&text, 10, 2).unwrap();
        for c in &chunks {
            assert!(c.chars().count() <= 10);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = format!("{}\n\n{}", words(300), words(200));
        let c1 = split(&text, 120, 30).unwrap();
        let c2 = split(&text, 120, 30).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_atomic_document_kept_whole() {
        let row = SourceDocument::atomic("x | ".repeat(100), "rows.csv");
        let chunks = split_document(&row, 50, 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.chars().count() > 50);
        assert_eq!(chunks[0].source_path, "rows.csv");
    }

    #[test]
    fn test_document_chunks_keep_source_path() {
        let doc = SourceDocument::new(words(100), "law/contracts.pdf");
        let chunks = split_document(&doc, 80, 20).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.source_path == "law/contracts.pdf"));
    }

    #[test]
    fn test_chunk_hash_stable() {
        assert_eq!(chunk_hash("abc"), chunk_hash("abc"));
        assert_ne!(chunk_hash("abc"), chunk_hash("abd"));
    }
}
