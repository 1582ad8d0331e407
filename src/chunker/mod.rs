
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A contiguous slice of a document's text, ready for embedding.
///
/// Offsets are character offsets into the original text. Adjacent chunks
/// overlap by the configured amount, so the union of all chunk ranges covers
/// the full document with no gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position of this chunk within the document
    pub sequence: usize,
    /// The chunk text, including the overlap seed from the previous chunk
    pub text: String,
    /// Character offset where this chunk starts in the original text
    pub char_start: usize,
    /// Character offset one past the end of this chunk
    pub char_end: usize,
    /// Source page, resolved from the page offset map when one is available
    pub page_number: Option<u32>,
}

/// Configuration for text chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Desired chunk length in characters
    pub target_size: usize,
    /// Trailing characters of each chunk re-prepended to the next one
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_size: 800,
            overlap: 100,
        }
    }
}

impl ChunkerConfig {
    /// Upper bound on chunk length before a break is forced (target * 1.2)
    #[inline]
    pub fn tolerance(&self) -> usize {
        self.target_size + self.target_size / 5
    }
}

/// Maps character offsets to source page numbers.
///
/// Built from the page boundaries reported by the upstream text extractor.
/// Boundaries must be sorted ascending by offset; `page_for_offset` resolves
/// an offset to the page whose boundary most recently precedes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOffsetMap {
    pub boundaries: Vec<PageBoundary>,
}

/// Character offset where a source page begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBoundary {
    pub char_offset: usize,
    pub page_number: u32,
}

impl PageOffsetMap {
    #[inline]
    pub fn page_for_offset(&self, offset: usize) -> Option<u32> {
        self.boundaries
            .iter()
            .take_while(|b| b.char_offset <= offset)
            .last()
            .map(|b| b.page_number)
    }
}

/// Splits document text into overlapping, bounded chunks.
///
/// Chunking is pure and deterministic: identical `(text, config)` input
/// always produces identical chunk boundaries, which is what makes re-index
/// comparisons reproducible.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    #[inline]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk `text` into an ordered sequence of overlapping chunks.
    ///
    /// The caller is responsible for rejecting empty or whitespace-only text
    /// before calling; for any non-empty input at least one chunk is
    /// produced. Chunks prefer to end at a paragraph or sentence boundary
    /// near the target size; when no boundary exists within the tolerance
    /// window the break is forced at the target size so that boundary-free
    /// runs are split rather than dropped.
    #[inline]
    pub fn chunk(&self, text: &str, page_map: Option<&PageOffsetMap>) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }

        let target = self.config.target_size.max(2);
        let overlap = self.config.overlap.min(target - 1);
        let tolerance = target + target / 5;

        let mut chunks = Vec::new();
        // Absolute offset where un-consumed content begins; strictly
        // increases every iteration.
        let mut consumed = 0;

        while consumed < len {
            let sequence = chunks.len();
            let start = if sequence == 0 {
                0
            } else {
                consumed.saturating_sub(overlap)
            };

            let end = if len - start <= tolerance {
                len
            } else {
                find_break(&chars, start, consumed, target, tolerance)
            };

            chunks.push(Chunk {
                sequence,
                text: chars[start..end].iter().collect(),
                char_start: start,
                char_end: end,
                page_number: page_map.and_then(|m| m.page_for_offset(start)),
            });

            consumed = end;
        }

        debug!(
            "Chunked {} chars into {} chunks (target {}, overlap {})",
            len,
            chunks.len(),
            target,
            overlap
        );

        chunks
    }
}

/// Pick the break position for a chunk starting at `start`.
///
/// Searches for a paragraph boundary, then a sentence boundary, closest to
/// `start + target` within the window `[lo, start + tolerance]`, where `lo`
/// guarantees forward progress past already-consumed text. Falls back to a
/// forced break at the target size.
fn find_break(chars: &[char], start: usize, consumed: usize, target: usize, tolerance: usize) -> usize {
    let desired = start + target;
    let hi = start + tolerance;
    let lo = (start + target / 2).max(consumed + 1);

    let boundaries: [fn(&[char], usize) -> bool; 2] = [is_paragraph_break, is_sentence_break];
    for boundary in boundaries {
        // Prefer the boundary at or before the target size
        for pos in (lo..=desired).rev() {
            if boundary(chars, pos) {
                return pos;
            }
        }
        // Otherwise the closest one inside the tolerance window
        for pos in desired + 1..=hi {
            if boundary(chars, pos) {
                return pos;
            }
        }
    }

    desired
}

/// A chunk ending at `pos` closes a paragraph (blank line before `pos`)
fn is_paragraph_break(chars: &[char], pos: usize) -> bool {
    pos >= 2 && chars[pos - 1] == '\n' && chars[pos - 2] == '\n'
}

/// A chunk ending at `pos` closes a sentence
fn is_sentence_break(chars: &[char], pos: usize) -> bool {
    if pos == 0 {
        return false;
    }
    let terminal = matches!(chars[pos - 1], '.' | '!' | '?');
    terminal && chars.get(pos).is_none_or(|c| c.is_whitespace())
}
