//! Overlapping character-window chunker.
//!
//! Splits extracted document text into fixed-size windows with a
//! configurable overlap between adjacent windows (zero overlap is valid).
//! Windows are aligned to `char` boundaries and cover the source with no
//! gaps: concatenating the chunks with each successor's leading overlap
//! removed reconstructs the source text exactly.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::ChunkingConfig;

/// Metadata key holding the original upload file name.
pub const META_FILE_NAME: &str = "file_name";
/// Metadata key holding the object-storage path, stamped during ingestion.
pub const META_SOURCE: &str = "source";

/// A contiguous span of source text destined for the vector index.
///
/// Immutable once written to the index; deleted only with its namespace.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub namespace: String,
    pub index: usize,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Split text into overlapping windows of at most `max_chars` characters.
///
/// Every window except the last has exactly `max_chars` characters; each
/// window after the first repeats the previous window's trailing
/// `overlap_chars` characters. Empty input yields a single empty chunk so
/// downstream steps never see an empty batch.
pub fn chunk_text(
    namespace: &str,
    file_name: &str,
    text: &str,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let step = config.max_chars - config.overlap_chars;
    debug_assert!(step > 0, "validated at config load");

    // Byte offset of every char boundary, so windows slice valid UTF-8.
    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_len = boundaries.len();

    let byte_at = |char_pos: usize| -> usize {
        boundaries.get(char_pos).copied().unwrap_or(text.len())
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + config.max_chars).min(char_len);
        let piece = &text[byte_at(start)..byte_at(end)];
        chunks.push(make_chunk(namespace, file_name, chunks.len(), piece));
        if end >= char_len {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(namespace: &str, file_name: &str, index: usize, text: &str) -> Chunk {
    let mut metadata = BTreeMap::new();
    metadata.insert(META_FILE_NAME.to_string(), file_name.to_string());

    Chunk {
        id: Uuid::new_v4().to_string(),
        namespace: namespace.to_string(),
        index,
        text: text.to_string(),
        metadata,
    }
}

/// Reassemble the original text from a chunk sequence by dropping each
/// successor's leading overlap. Used by tests to verify gap-free coverage.
pub fn reassemble(chunks: &[Chunk], overlap_chars: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap_chars));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("manual.pdf", "manual.pdf", "hello world", &cfg(100, 10));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].namespace, "manual.pdf");
    }

    #[test]
    fn empty_text_yields_one_empty_chunk() {
        let chunks = chunk_text("ns", "f.txt", "", &cfg(100, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text("ns", "f.txt", text, &cfg(10, 3));
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert!(chunks[1].text.starts_with(&chunks[0].text[7..]));
    }

    #[test]
    fn zero_overlap_is_valid() {
        let text = "abcdefghij".repeat(5);
        let chunks = chunk_text("ns", "f.txt", &text, &cfg(10, 0));
        assert_eq!(chunks.len(), 5);
        assert_eq!(reassemble(&chunks, 0), text);
    }

    #[test]
    fn roundtrip_reconstructs_source_exactly() {
        let samples = [
            "The quick brown fox jumps over the lazy dog. ".repeat(40),
            "short".to_string(),
            "exactly-ten".to_string(),
            "Ünïcödé — überschüssige Zeichenketten mit Umlauten. ".repeat(30),
        ];
        for text in &samples {
            for (max, overlap) in [(50, 0), (50, 10), (64, 63), (7, 2)] {
                let chunks = chunk_text("ns", "f.txt", text, &cfg(max, overlap));
                assert_eq!(
                    reassemble(&chunks, overlap),
                    *text,
                    "max={max} overlap={overlap}"
                );
            }
        }
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let text = "x".repeat(1000);
        let chunks = chunk_text("ns", "f.txt", &text, &cfg(64, 16));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn every_chunk_carries_file_provenance() {
        let chunks = chunk_text("ns", "manual.pdf", &"y".repeat(300), &cfg(100, 20));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(c.metadata.get(META_FILE_NAME).unwrap(), "manual.pdf");
        }
    }

    #[test]
    fn multibyte_text_slices_on_char_boundaries() {
        let text = "éàü".repeat(40);
        let chunks = chunk_text("ns", "f.txt", &text, &cfg(16, 4));
        assert_eq!(reassemble(&chunks, 4), text);
    }
}
