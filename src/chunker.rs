//! Structured chunking of knowledge-base documents.
//!
//! Documents are split along their visible structure rather than at
//! arbitrary byte offsets: horizontal-rule separators delimit sections, and
//! oversized sections are packed paragraph by paragraph. The result feeds
//! the embedding step during ingestion, so ordering is load-bearing:
//! chunks always come out in document order.
//!
//! # Examples
//!
//! ```
//! use docent::chunker::structured_chunks;
//!
//! let chunks = structured_chunks("SECTION A\n-----\nSECTION B", 100);
//! assert_eq!(chunks, vec!["SECTION A".to_string(), "SECTION B".to_string()]);
//! ```

use std::sync::LazyLock;

use regex::Regex;

/// Horizontal-rule separator: a run of five or more dashes.
static SECTION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{5,}").expect("separator regex"));

/// Paragraph boundary: one or more blank lines.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph regex"));

/// Splits document text into bounded-size, structure-respecting chunks.
///
/// The algorithm:
///
/// 1. Split on runs of 5+ dashes into sections, discarding blank sections.
///    A document without separators is a single section.
/// 2. A section whose trimmed length fits `max_chunk_size` becomes one
///    chunk with its internal structure intact.
/// 3. An oversized section is split on blank-line paragraph boundaries and
///    consecutive paragraphs are greedily packed until the next one would
///    overflow the limit. A single paragraph longer than the limit is
///    flushed as its own oversized chunk rather than fragmented mid-text.
///
/// Never returns an empty or whitespace-only chunk, and the concatenation
/// order of chunks always mirrors document order. Pure function; malformed
/// whitespace in the input is tolerated, not rejected.
#[must_use]
pub fn structured_chunks(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();

    for section in SECTION_SEPARATOR.split(text) {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }
        if section.len() <= max_chunk_size {
            chunks.push(section.to_string());
        } else {
            pack_paragraphs(section, max_chunk_size, &mut chunks);
        }
    }

    chunks
}

/// Greedily packs a section's paragraphs into chunks of at most
/// `max_chunk_size`, flushing oversized single paragraphs as-is.
fn pack_paragraphs(section: &str, max_chunk_size: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();

    for paragraph in PARAGRAPH_BREAK.split(section) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.len() > max_chunk_size {
            // A single semantic unit that cannot be packed: flush what we
            // have, then emit the paragraph on its own.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(paragraph.to_string());
            continue;
        }

        if current.is_empty() {
            current.push_str(paragraph);
        } else if current.len() + 2 + paragraph.len() <= max_chunk_size {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
}
