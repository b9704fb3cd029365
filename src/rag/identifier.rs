//! Deterministic chunk identifiers.
//!
//! A chunk id has the canonical form `<source>:<page>:<chunk_index>`, where
//! `chunk_index` counts chunks within one page starting at 0. This text is
//! the primary key in the index, so the format must not change without a
//! migration.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::splitter::ChunkCandidate;
use crate::core::errors::RagError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub source: String,
    pub page: u32,
    pub chunk_index: u32,
}

impl ChunkId {
    pub fn new(source: impl Into<String>, page: u32, chunk_index: u32) -> Self {
        Self {
            source: source.into(),
            page,
            chunk_index,
        }
    }

    /// `<source>:<page>`, the key that resets the chunk counter.
    pub fn page_id(&self) -> String {
        page_id(&self.source, self.page)
    }
}

pub fn page_id(source: &str, page: u32) -> String {
    format!("{}:{}", source, page)
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.page, self.chunk_index)
    }
}

impl FromStr for ChunkId {
    type Err = RagError;

    /// Parses from the right, so sources may themselves contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let (Some(index), Some(page), Some(source)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(RagError::IndexStore(format!("malformed chunk id '{}'", s)));
        };

        let parse = |field: &str| -> Result<u32, RagError> {
            // decimal, no sign, no leading zeros
            if field.is_empty()
                || !field.bytes().all(|b| b.is_ascii_digit())
                || (field.len() > 1 && field.starts_with('0'))
            {
                return Err(RagError::IndexStore(format!("malformed chunk id '{}'", s)));
            }
            field
                .parse::<u32>()
                .map_err(|_| RagError::IndexStore(format!("malformed chunk id '{}'", s)))
        };

        Ok(ChunkId {
            source: source.to_string(),
            page: parse(page)?,
            chunk_index: parse(index)?,
        })
    }
}

/// A chunk candidate with its identifier assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedChunk {
    pub id: ChunkId,
    pub text: String,
    pub start_offset: usize,
}

/// Assign ids to candidates.
///
/// Candidates must arrive grouped per document and per page, in extraction
/// order: the counter increments while the `source:page` key repeats and
/// resets to 0 when it changes. A page key that reappears after another
/// page has started is rejected with `ChunkOrder`, since numbering it would
/// collide with ids already handed out.
pub fn assign_chunk_ids(candidates: Vec<ChunkCandidate>) -> Result<Vec<IdentifiedChunk>, RagError> {
    let mut last_page_id: Option<String> = None;
    let mut current_chunk_index: u32 = 0;
    let mut finished_pages: HashSet<String> = HashSet::new();
    let mut identified = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let current_page_id = page_id(&candidate.source, candidate.page);

        if last_page_id.as_deref() == Some(current_page_id.as_str()) {
            current_chunk_index += 1;
        } else {
            if finished_pages.contains(&current_page_id) {
                return Err(RagError::ChunkOrder(format!(
                    "page '{}' is not contiguous",
                    current_page_id
                )));
            }
            if let Some(previous) = last_page_id.take() {
                finished_pages.insert(previous);
            }
            current_chunk_index = 0;
        }

        identified.push(IdentifiedChunk {
            id: ChunkId::new(candidate.source, candidate.page, current_chunk_index),
            text: candidate.text,
            start_offset: candidate.start_offset,
        });
        last_page_id = Some(current_page_id);
    }

    Ok(identified)
}
