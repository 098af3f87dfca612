//! Boundary-preferring text chunker.
//!
//! Splits document text into [`Chunk`]s bounded by a configurable
//! `chunk_size`. Splitting tries paragraph breaks (`\n\n`) first, then
//! line breaks, then spaces, then falls back to raw character boundaries,
//! so chunk edges land on natural language boundaries where possible.
//!
//! Adjacent chunks from the same document share an `overlap`-length
//! region taken from the original text: the later chunk is prefixed with
//! the bytes immediately before its split point, so a sentence straddling
//! a boundary survives intact in at least one chunk.

use std::ops::Range;

use crate::models::{Chunk, SourceDocument};

/// Split order: paragraphs, then lines, then words. Character-level
/// splitting is the implicit last resort.
const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

/// Split a batch of source documents into chunks.
///
/// `seq` restarts at 0 for each source document. An empty document
/// produces zero chunks; a document no longer than `chunk_size` produces
/// exactly one chunk with no overlap applied.
pub fn split_documents(
    documents: &[SourceDocument],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for doc in documents {
        for (i, text) in split_text(&doc.text, chunk_size, overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(Chunk {
                text,
                source_name: doc.source_name.clone(),
                locus: doc.locus.clone(),
                seq: i as i64,
            });
        }
    }
    chunks
}

/// Split one text into overlapping, size-bounded pieces.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    // Base pieces are bounded by chunk_size - overlap so that prefixing
    // the overlap region keeps every chunk within chunk_size.
    let piece_max = chunk_size.saturating_sub(overlap).max(1);
    let mut ranges = Vec::new();
    split_ranges(text, 0, piece_max, SEPARATORS, &mut ranges);

    let mut out = Vec::with_capacity(ranges.len());
    for (i, r) in ranges.iter().enumerate() {
        let start = if i == 0 {
            r.start
        } else {
            // Pull the overlap from the original text, snapping forward
            // to a char boundary.
            let mut s = r.start.saturating_sub(overlap);
            while !text.is_char_boundary(s) {
                s += 1;
            }
            s
        };
        out.push(text[start..r.end].to_string());
    }
    out
}

/// Recursively split `text` into contiguous byte ranges of at most `max`
/// bytes, preferring the separators in `seps` in order.
///
/// Ranges are reported relative to the original text via `base` and cover
/// it without gaps: each segment keeps its trailing separator.
fn split_ranges(text: &str, base: usize, max: usize, seps: &[&str], out: &mut Vec<Range<usize>>) {
    if text.len() <= max {
        if !text.is_empty() {
            out.push(base..base + text.len());
        }
        return;
    }

    let Some((sep, rest)) = seps.split_first() else {
        hard_split(text, base, max, out);
        return;
    };

    if !text.contains(sep) {
        split_ranges(text, base, max, rest, out);
        return;
    }

    // Segment on the separator, keeping the separator with the earlier
    // segment so ranges stay contiguous.
    let mut segments: Vec<Range<usize>> = Vec::new();
    let mut pos = 0;
    while let Some(found) = text[pos..].find(sep) {
        let end = pos + found + sep.len();
        segments.push(pos..end);
        pos = end;
    }
    if pos < text.len() {
        segments.push(pos..text.len());
    }

    // Greedily merge adjacent segments while they fit; a lone segment
    // larger than max recurses with the next separator.
    let mut current: Option<Range<usize>> = None;
    for seg in segments {
        match current.take() {
            Some(cur) if seg.end - cur.start <= max => {
                current = Some(cur.start..seg.end);
            }
            Some(cur) => {
                out.push(base + cur.start..base + cur.end);
                current = Some(seg);
            }
            None => current = Some(seg),
        }
        if let Some(cur) = &current {
            if cur.end - cur.start > max {
                split_ranges(&text[cur.clone()], base + cur.start, max, rest, out);
                current = None;
            }
        }
    }
    if let Some(cur) = current {
        out.push(base + cur.start..base + cur.end);
    }
}

/// Last-resort split at char boundaries, at most `max` bytes per piece.
fn hard_split(text: &str, base: usize, max: usize, out: &mut Vec<Range<usize>>) {
    let mut start = 0;
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        if idx + ch.len_utf8() - start > max && idx > start {
            out.push(base + start..base + idx);
            start = idx;
        }
        end = idx + ch.len_utf8();
    }
    if start < end {
        out.push(base + start..base + end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Locus;

    fn doc(text: &str) -> SourceDocument {
        SourceDocument {
            text: text.to_string(),
            source_name: "test.txt".to_string(),
            locus: Locus::Whole,
        }
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(split_text("", 1000, 200).is_empty());
        assert!(split_text("   \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunks = split_text("Paris is the capital of France.", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Paris is the capital of France.");
    }

    #[test]
    fn chunks_respect_size_bound() {
        let text = (0..60)
            .map(|i| format!("Paragraph number {} with a bit of body text in it.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        for chunk in split_text(&text, 200, 40) {
            assert!(
                chunk.len() <= 200,
                "chunk exceeds bound: {} bytes",
                chunk.len()
            );
        }
    }

    #[test]
    fn unsplittable_run_is_hard_split() {
        let text = "x".repeat(950);
        let chunks = split_text(&text, 100, 0);
        assert!(chunks.len() >= 10);
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        let overlap = 20;
        let text = (0..40)
            .map(|i| format!("Sentence number {} provides filler content here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 120, overlap);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            assert!(
                earlier.ends_with(&later[..overlap]),
                "overlap mismatch between {:?} and {:?}",
                earlier,
                later
            );
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = "First paragraph about one topic.\n\nSecond paragraph about another.";
        let chunks = split_text(text, 40, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("First paragraph"));
        assert!(chunks[1].starts_with("Second paragraph"));
    }

    #[test]
    fn sequence_indices_restart_per_document() {
        let docs = vec![doc("Alpha beta gamma delta."), doc("Epsilon zeta eta.")];
        let chunks = split_documents(&docs, 1000, 200);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].seq, 0);
        assert_eq!(chunks[1].seq, 0);
    }

    #[test]
    fn deterministic() {
        let text = "Alpha.\n\nBeta.\n\nGamma.\n\nDelta and some longer trailing content.";
        let a = split_text(text, 30, 5);
        let b = split_text(text, 30, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn multibyte_boundaries_are_respected() {
        let text = "é".repeat(400);
        for chunk in split_text(&text, 100, 20) {
            assert!(chunk.len() <= 100);
            assert!(chunk.chars().all(|c| c == 'é'));
        }
    }
}
