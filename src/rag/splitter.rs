//! Sliding-window text splitter.
//!
//! Windows are at most `chunk_size` characters and each window after the
//! first starts exactly `chunk_overlap` characters before the previous one
//! ended, so dropping the first `chunk_overlap` characters of every chunk
//! but the first and concatenating reconstructs the input.

use serde::{Deserialize, Serialize};

use super::loader::PageText;

/// Preferred cut points, strongest first. The cut falls after the separator.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "? ", "! ", " "];

/// A chunk before identifier assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCandidate {
    pub source: String,
    pub page: u32,
    pub text: String,
    /// Character offset within the page text.
    pub start_offset: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every page, preserving page order. Blank pages produce nothing.
    pub fn split(&self, pages: &[PageText]) -> Vec<ChunkCandidate> {
        let mut candidates = Vec::new();
        for page in pages {
            if page.text.trim().is_empty() {
                continue;
            }
            for (start_offset, text) in self.split_text(&page.text) {
                candidates.push(ChunkCandidate {
                    source: page.source.clone(),
                    page: page.page,
                    text,
                    start_offset,
                });
            }
        }
        candidates
    }

    /// Split one text into `(start_offset, chunk)` pairs.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        if total == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                self.find_break(&chars, start, hard_end)
            } else {
                total
            };

            chunks.push((start, chars[start..end].iter().collect()));

            if end == total {
                break;
            }
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Latest separator boundary in the back half of the window, else `hard_end`.
    ///
    /// The result always exceeds `start + chunk_overlap`, so the next window
    /// starts strictly later than this one.
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_end = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);
        if min_end >= hard_end {
            return hard_end;
        }

        for separator in SEPARATORS {
            let sep: Vec<char> = separator.chars().collect();
            let mut cut = hard_end;
            while cut >= min_end {
                if cut >= sep.len() && chars[cut - sep.len()..cut] == sep[..] {
                    return cut;
                }
                cut -= 1;
            }
        }

        hard_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(chunks: &[(usize, String)], overlap: usize) -> String {
        let mut text = String::new();
        for (i, (_, chunk)) in chunks.iter().enumerate() {
            if i == 0 {
                text.push_str(chunk);
            } else {
                text.extend(chunk.chars().skip(overlap));
            }
        }
        text
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!(
                "Sentence number {} talks about raclette and mountains. ",
                i
            ));
            if i % 7 == 6 {
                text.push_str("\n\n");
            }
        }
        text
    }

    #[test]
    fn chunks_respect_max_length_and_reconstruct() {
        let text = sample_text();
        let splitter = TextSplitter::new(120, 20);
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|(_, c)| c.chars().count() <= 120));
        assert_eq!(reconstruct(&chunks, 20), text);
    }

    #[test]
    fn consecutive_chunks_overlap_by_configured_amount() {
        let text = sample_text();
        let splitter = TextSplitter::new(100, 15);
        let chunks = splitter.split_text(&text);

        for pair in chunks.windows(2) {
            let (prev_start, prev) = &pair[0];
            let (next_start, next) = &pair[1];
            let prev_end = prev_start + prev.chars().count();
            assert_eq!(*next_start, prev_end - 15);

            let tail: String = prev.chars().skip(prev.chars().count() - 15).collect();
            let head: String = next.chars().take(15).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(70), "b".repeat(70));
        let chunks = TextSplitter::new(100, 10).split_text(&text);

        assert!(chunks[0].1.ends_with("\n\n"));
        assert_eq!(chunks[0].1.chars().count(), 72);
    }

    #[test]
    fn text_without_separators_uses_hard_windows() {
        let text = "x".repeat(250);
        let chunks = TextSplitter::new(100, 10).split_text(&text);

        let starts: Vec<usize> = chunks.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0, 90, 180]);
        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn multibyte_text_is_split_on_characters() {
        let text = "é".repeat(30) + &"日本".repeat(20);
        let chunks = TextSplitter::new(25, 5).split_text(&text);

        assert!(chunks.iter().all(|(_, c)| c.chars().count() <= 25));
        assert_eq!(reconstruct(&chunks, 5), text);
    }

    #[test]
    fn short_and_empty_text() {
        let splitter = TextSplitter::new(800, 80);
        assert!(splitter.split_text("").is_empty());
        assert_eq!(splitter.split_text("tiny"), vec![(0, "tiny".to_string())]);
    }

    #[test]
    fn split_keeps_locator_and_skips_blank_pages() {
        let pages = vec![
            PageText {
                source: "docA".into(),
                page: 0,
                text: "x".repeat(150),
            },
            PageText {
                source: "docA".into(),
                page: 1,
                text: "   \n".into(),
            },
            PageText {
                source: "docA".into(),
                page: 2,
                text: "last page".into(),
            },
        ];
        let candidates = TextSplitter::new(100, 10).split(&pages);

        let locators: Vec<(u32, usize)> =
            candidates.iter().map(|c| (c.page, c.start_offset)).collect();
        assert_eq!(locators, vec![(0, 0), (0, 90), (2, 0)]);
        assert!(candidates.iter().all(|c| c.source == "docA"));
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let splitter = TextSplitter::new(10, 50);
        assert_eq!(splitter.chunk_overlap(), 9);
        let chunks = splitter.split_text(&"y".repeat(30));
        assert_eq!(reconstruct(&chunks, 9), "y".repeat(30));
    }
}
