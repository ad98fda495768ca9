//! Reassembly of chunked payloads scanned in any order

use std::collections::BTreeMap;

use thiserror::Error;

use crate::chunk::{self, ChunkTag};

/// Failure to turn collected pages into an application value
#[derive(Debug, Error)]
pub enum ReassembleError<E> {
    #[error("{added} of {expected} pages scanned")]
    PagesMissing { added: usize, expected: usize },

    #[error("Scanned data could not be read: {0}")]
    Deserialize(E),
}

/// Collects the pages of one logical message for a single protocol tag.
///
/// A page announcing a different page count than the pages already held
/// starts a new collection with that page; this covers a sender switching
/// resolution in the middle of a scan.
#[derive(Debug, Clone)]
pub struct PageCollector {
    tag: ChunkTag,
    expected_count: Option<usize>,
    chunks: BTreeMap<usize, String>,
}

impl PageCollector {
    pub fn new(tag: ChunkTag) -> Self {
        Self {
            tag,
            expected_count: None,
            chunks: BTreeMap::new(),
        }
    }

    pub fn tag(&self) -> ChunkTag {
        self.tag
    }

    /// Add a scanned string. Returns false, leaving state untouched, when it
    /// is not a chunk of this collector's tag.
    pub fn add_chunk(&mut self, raw: &str) -> bool {
        let Some(chunk) = chunk::decode(raw, self.tag) else {
            tracing::trace!(tag = %self.tag, "Ignoring scan without matching chunk header");
            return false;
        };

        match self.expected_count {
            Some(expected) if expected != chunk.page_count => {
                tracing::info!(
                    tag = %self.tag,
                    expected,
                    announced = chunk.page_count,
                    discarded = self.chunks.len(),
                    "Page count changed, restarting collection"
                );
                self.chunks.clear();
            }
            _ => {}
        }

        self.expected_count = Some(chunk.page_count);
        self.chunks.insert(chunk.page_index, chunk.fragment);
        true
    }

    pub fn has_all_pages(&self) -> bool {
        self.expected_count == Some(self.chunks.len())
    }

    pub fn pages_added(&self) -> usize {
        self.chunks.len()
    }

    /// Page count announced by the current collection, 0 before the first page
    pub fn pages_count(&self) -> usize {
        self.expected_count.unwrap_or(0)
    }

    /// Indices still missing, for progress display
    pub fn missing_pages(&self) -> Vec<usize> {
        (0..self.pages_count())
            .filter(|i| !self.chunks.contains_key(i))
            .collect()
    }

    /// Concatenated payload once every page is present
    pub fn reassemble(&self) -> Result<String, ReassembleError<std::convert::Infallible>> {
        if !self.has_all_pages() {
            return Err(ReassembleError::PagesMissing {
                added: self.pages_added(),
                expected: self.pages_count(),
            });
        }
        Ok(self.chunks.values().map(String::as_str).collect())
    }

    /// Reassemble and hand the payload to an application deserializer
    pub fn reassemble_with<T, E, F>(&self, deserialize: F) -> Result<T, ReassembleError<E>>
    where
        F: FnOnce(&str) -> Result<T, E>,
    {
        let payload = self.reassemble().map_err(|e| match e {
            ReassembleError::PagesMissing { added, expected } => {
                ReassembleError::PagesMissing { added, expected }
            }
            ReassembleError::Deserialize(never) => match never {},
        })?;
        deserialize(&payload).map_err(ReassembleError::Deserialize)
    }

    /// Drop everything collected so far
    pub fn reset(&mut self) {
        self.expected_count = None;
        self.chunks.clear();
    }
}
