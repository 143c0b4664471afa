//! Chunked body loading with progress and retry.
//!
//! State transitions: `Idle -> Loading -> Idle (chunk appended) | Error`. A `load_more` from the
//! error state is the retry. At most one chunk request is in flight per loader.

use bodyscope_core::{ChunkLoader, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Loaded text plus progress for one body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginatedBodyState {
    pub content: String,
    /// Bytes appended so far. Never decreases until `reset`.
    pub loaded_bytes: u64,
    /// `None` when the total is unknown.
    pub total_size: Option<u64>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Set once the loader reports end of data.
    pub finished: bool,
}

/// Progress without the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationSummary {
    pub loaded_bytes: u64,
    pub total_size: Option<u64>,
    pub has_more: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl PaginatedBodyState {
    pub fn new(initial_chunk: impl Into<String>, total_size: Option<u64>) -> Self {
        let content = initial_chunk.into();
        Self {
            loaded_bytes: content.len() as u64,
            content,
            total_size,
            ..Self::default()
        }
    }

    pub fn has_more(&self) -> bool {
        if self.finished {
            return false;
        }
        match self.total_size {
            Some(total) => self.loaded_bytes < total,
            None => true,
        }
    }

    /// A successful load: append and return to idle.
    pub fn append_content(&mut self, chunk: &str) {
        self.content.push_str(chunk);
        self.loaded_bytes += chunk.len() as u64;
        self.is_loading = false;
        self.error = None;
    }

    pub fn update_loading(&mut self, loading: bool) {
        self.is_loading = loading;
        if loading {
            self.error = None;
        }
    }

    /// A failed load: progress is kept, loading stops.
    pub fn update_error(&mut self, error: Option<String>) {
        self.error = error;
        self.is_loading = false;
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
        self.is_loading = false;
    }

    /// Start over with a fresh first chunk.
    pub fn reset(&mut self, initial_chunk: impl Into<String>, total_size: Option<u64>) {
        *self = Self::new(initial_chunk, total_size);
    }

    pub fn summary(&self) -> PaginationSummary {
        PaginationSummary {
            loaded_bytes: self.loaded_bytes,
            total_size: self.total_size,
            has_more: self.has_more(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A load was already in flight, or nothing is left.
    Skipped,
    Appended(usize),
    /// The loader reported end of data.
    Finished,
    Failed(String),
    /// A `reset` happened while the chunk was in flight; the chunk was dropped.
    Stale,
}

struct Inner {
    state: PaginatedBodyState,
    generation: u64,
    /// Generation of the request currently awaiting the loader, if any.
    in_flight: Option<u64>,
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases the in-flight slot when a `load_more` future ends without applying its result.
struct InFlight<'a> {
    inner: &'a Mutex<Inner>,
    idle: &'a Notify,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut g = lock_inner(self.inner);
            g.in_flight = None;
            if g.generation == self.generation {
                tracing::debug!(loaded = g.state.loaded_bytes, "chunk load cancelled");
                g.state.update_loading(false);
            }
        }
        self.idle.notify_waiters();
    }
}

/// Drives a [`PaginatedBodyState`] from a [`ChunkLoader`].
///
/// The state lock is never held across the loader's await.
pub struct PaginatedLoader<L> {
    loader: L,
    inner: Mutex<Inner>,
    idle: Notify,
}

impl<L: ChunkLoader> PaginatedLoader<L> {
    pub fn new(loader: L, initial_chunk: impl Into<String>, total_size: Option<u64>) -> Self {
        Self {
            loader,
            inner: Mutex::new(Inner {
                state: PaginatedBodyState::new(initial_chunk, total_size),
                generation: 0,
                in_flight: None,
            }),
            idle: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    pub fn state(&self) -> PaginatedBodyState {
        self.lock().state.clone()
    }

    pub fn summary(&self) -> PaginationSummary {
        self.lock().state.summary()
    }

    pub fn has_more(&self) -> bool {
        self.lock().state.has_more()
    }

    pub fn content(&self) -> String {
        self.lock().state.content.clone()
    }

    /// Claim the in-flight slot, waiting out a request left over from before a `reset`.
    async fn begin(&self) -> Option<InFlight<'_>> {
        loop {
            let idle = self.idle.notified();
            {
                let mut g = self.lock();
                let in_flight = g.in_flight;
                match in_flight {
                    Some(pending) if pending != g.generation => {}
                    Some(_) => return None,
                    None if g.state.is_loading || !g.state.has_more() => return None,
                    None => {
                        let generation = g.generation;
                        g.in_flight = Some(generation);
                        g.state.update_loading(true);
                        return Some(InFlight {
                            inner: &self.inner,
                            idle: &self.idle,
                            generation,
                            settled: false,
                        });
                    }
                }
            }
            tracing::debug!("waiting for request issued before reset");
            idle.await;
        }
    }

    pub async fn load_more(&self) -> LoadOutcome {
        let Some(mut flight) = self.begin().await else {
            return LoadOutcome::Skipped;
        };

        let res = self.loader.load_next().await;

        let mut g = self.lock();
        g.in_flight = None;
        flight.settled = true;
        if g.generation != flight.generation {
            tracing::debug!("dropping chunk loaded before reset");
            return LoadOutcome::Stale;
        }
        match res {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                g.state.append_content(&chunk);
                LoadOutcome::Appended(chunk.len())
            }
            Ok(_) => {
                g.state.mark_finished();
                LoadOutcome::Finished
            }
            Err(e) => {
                let msg = e.to_string();
                tracing::warn!(error = %msg, loaded = g.state.loaded_bytes, "chunk load failed");
                g.state.update_error(Some(msg.clone()));
                LoadOutcome::Failed(msg)
            }
        }
    }

    /// Replace the state. A load still in flight is discarded when it lands, and the next
    /// `load_more` waits for it before asking the loader again.
    pub fn reset(&self, initial_chunk: impl Into<String>, total_size: Option<u64>) {
        let mut g = self.lock();
        g.generation += 1;
        g.state.reset(initial_chunk, total_size);
    }
}

/// Serves an in-memory body in page-sized chunks, never splitting a UTF-8 code point.
#[derive(Debug)]
pub struct BlobChunkLoader {
    text: Arc<str>,
    page_size: usize,
    cursor: Mutex<usize>,
}

impl BlobChunkLoader {
    /// Start serving `text` from byte `offset` (rounded down to a char boundary).
    pub fn new(text: impl Into<Arc<str>>, page_size: usize, offset: usize) -> Self {
        let text = text.into();
        let mut start = offset.min(text.len());
        while !text.is_char_boundary(start) {
            start -= 1;
        }
        Self {
            text,
            page_size: page_size.max(1),
            cursor: Mutex::new(start),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.text.len()
    }

    fn next_chunk(&self) -> Option<String> {
        let mut cur = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let start = *cur;
        if start >= self.text.len() {
            return None;
        }
        let mut end = (start + self.page_size).min(self.text.len());
        while !self.text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // Page smaller than one char: take the whole char.
            end = start + 1;
            while !self.text.is_char_boundary(end) {
                end += 1;
            }
        }
        *cur = end;
        Some(self.text[start..end].to_string())
    }
}

#[async_trait::async_trait]
impl ChunkLoader for BlobChunkLoader {
    async fn load_next(&self) -> Result<Option<String>> {
        Ok(self.next_chunk())
    }
}
