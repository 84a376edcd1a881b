//! Recursive character text splitter.
//!
//! Splits rendered record text into [`Chunk`]s of at most `chunk_size`
//! characters with up to `chunk_overlap` characters carried over between
//! neighbours. Separators are tried coarsest first (`"\n\n"`, `"\n"`, `" "`,
//! then single characters); pieces that are still too long are split again
//! with the next separator.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::{Chunk, Metadata};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split `text` into chunks carrying `source` and `metadata`.
/// Returns chunks with contiguous indices starting at 0; blank text yields
/// no chunks.
pub fn chunk_text(
    source: &str,
    text: &str,
    metadata: &Metadata,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .map(|piece| make_chunk(source, &piece, metadata))
        .collect()
}

/// Split `text` into trimmed, non-empty pieces of at most `chunk_size`
/// characters.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(
    text: &str,
    separators: &[&'static str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    // Pick the first separator present in the text; "" always matches.
    let mut separator = "";
    let mut rest: &[&'static str] = &[];
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            separator = sep;
            rest = &[];
            break;
        }
        if text.contains(sep) {
            separator = sep;
            rest = &separators[i + 1..];
            break;
        }
    }

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(separator)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut out = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for piece in pieces {
        if char_len(&piece) < chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            out.extend(merge_pieces(&pending, separator, chunk_size, chunk_overlap));
            pending.clear();
        }

        if rest.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else {
            out.extend(split_recursive(&piece, rest, chunk_size, chunk_overlap));
        }
    }

    if !pending.is_empty() {
        out.extend(merge_pieces(&pending, separator, chunk_size, chunk_overlap));
    }

    out
}

/// Greedily join small pieces into chunks, keeping a tail of up to
/// `chunk_overlap` characters as the start of the next chunk.
fn merge_pieces(
    pieces: &[String],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut out = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        let joined_len = if window.is_empty() { 0 } else { sep_len };

        if total + len + joined_len > chunk_size && !window.is_empty() {
            push_joined(&mut out, &window, separator);

            // Drop from the front until what is left fits as overlap and
            // leaves room for the incoming piece.
            loop {
                let joined_len = if window.is_empty() { 0 } else { sep_len };
                let too_long = total > 0 && total + len + joined_len > chunk_size;
                if total <= chunk_overlap && !too_long {
                    break;
                }
                let Some(front) = window.pop_front() else {
                    break;
                };
                let dropped_sep = if window.is_empty() { 0 } else { sep_len };
                total -= char_len(front) + dropped_sep;
            }
        }

        if !window.is_empty() {
            total += sep_len;
        }
        total += len;
        window.push_back(piece);
    }

    push_joined(&mut out, &window, separator);
    out
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn make_chunk(source: &str, text: &str, metadata: &Metadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        text: text.to_string(),
        hash,
        metadata: metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: usize) -> String {
        (0..n)
            .map(|i| format!("column_{}: value number {}", i, i))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("T", "code: MAT101 | name: Calculus", &Metadata::new(), 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "code: MAT101 | name: Calculus");
        assert_eq!(chunks[0].source, "T");
    }

    #[test]
    fn test_blank_text_no_chunks() {
        assert!(chunk_text("T", "   \n\n ", &Metadata::new(), 500, 50).is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = row(80);
        assert!(text.chars().count() > 500);
        let pieces = split_text(&text, 500, 50);
        assert!(pieces.len() > 1);
        for p in &pieces {
            assert!(p.chars().count() <= 500, "chunk too long: {}", p.len());
        }
    }

    #[test]
    fn test_neighbouring_chunks_overlap() {
        let text = row(80);
        let pieces = split_text(&text, 500, 50);
        for pair in pieces.windows(2) {
            let shared = (10..=pair[0].len())
                .any(|n| pair[1].starts_with(&pair[0][pair[0].len() - n..]));
            assert!(
                shared,
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_overlap_covers_all_words() {
        let text = row(40);
        let pieces = split_text(&text, 100, 0);
        let rejoined = pieces.join(" ");
        assert_eq!(rejoined.split_whitespace().count(), text.split_whitespace().count());
    }

    #[test]
    fn test_long_word_split_by_characters() {
        let text = "x".repeat(1200);
        let pieces = split_text(&text, 500, 50);
        assert!(pieces.len() >= 3);
        for p in &pieces {
            assert!(p.chars().count() <= 500);
        }
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let text = "áéíóú ".repeat(200);
        for p in split_text(&text, 100, 10) {
            assert!(p.chars().count() <= 100);
        }
    }

    #[test]
    fn test_paragraphs_preferred() {
        let text = format!("{}\n\n{}", "a ".repeat(100), "b ".repeat(100));
        let pieces = split_text(&text, 250, 0);
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].starts_with('a'));
        assert!(pieces[1].starts_with('b'));
    }

    #[test]
    fn test_metadata_and_hash_attached() {
        let mut meta = Metadata::new();
        meta.insert("id".into(), "MAT101".into());
        let chunks = chunk_text("T", &row(60), &meta, 200, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(c.metadata.get("id").unwrap(), "MAT101");
            assert_eq!(c.hash.len(), 64);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = row(70);
        assert_eq!(split_text(&text, 300, 30), split_text(&text, 300, 30));
    }
}
