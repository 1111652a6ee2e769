//! FAQ search service.
//!
//! Ties the pieces together:
//! - resolves embeddings through query cache, then store, then encoder
//! - builds the HNSW graph from corpus entries
//! - turns raw neighbours into a deduplicated, ranked answer list
//! - lets an exact dictionary hit override the semantic ranking

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::faq::{ExactMatchDictionary, FaqConfig, FaqEntry, FaqResponseEntry};
use crate::semantic::distance::DistanceFn;
use crate::semantic::encoder::{EncodeError, VectorEncoder};
use crate::semantic::hnsw::{HnswIndex, HnswParams, IndexError, IndexSnapshot, SeededRandom};
use crate::semantic::lazy::LazyRegistry;
use crate::semantic::store::{EmbeddingStore, StoreError};

pub const MIN_RESPONSES: usize = 1;
pub const MAX_RESPONSES: usize = 50;
/// Neighbours fetched when several indexed variants may share an answer.
pub const SEARCH_AMOUNT: usize = 4 * MAX_RESPONSES;
/// Queries are cut to this many characters before encoding.
pub const MAX_QUERY_LENGTH: usize = 4000;

/// Errors that can occur during FAQ search operations.
#[derive(Debug, thiserror::Error)]
pub enum FaqError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Encoder error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which text of an entry gets embedded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IngestMode {
    /// One vector per keyword/question variant.
    #[default]
    QuestionToQuestion,
    /// One vector per record, built from the answer text.
    QuestionToAnswer,
}

impl IngestMode {
    pub fn embedded_text(self, entry: &FaqEntry) -> &str {
        match self {
            IngestMode::QuestionToQuestion => &entry.question,
            IngestMode::QuestionToAnswer => &entry.answer,
        }
    }
}

#[derive(Clone, Copy)]
enum WriteBack {
    Store,
    Cache,
}

/// Layered embedding lookup.
#[derive(Clone)]
struct Embedder {
    encoder: Arc<dyn VectorEncoder>,
    store: Option<Arc<dyn EmbeddingStore>>,
    cache: Option<Arc<dyn EmbeddingStore>>,
}

impl Embedder {
    fn check(&self, vector: Vec<f32>) -> Result<Vec<f32>, FaqError> {
        let expected = self.encoder.dimension();
        if vector.len() != expected {
            return Err(FaqError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }
        Ok(vector)
    }

    fn resolve(&self, text: &str, write_back: WriteBack) -> Result<Vec<f32>, FaqError> {
        for layer in [&self.cache, &self.store].into_iter().flatten() {
            if let Some(vector) = layer.get(text)? {
                return self.check(vector);
            }
        }

        let vector = self.encoder.encode(text)?;

        let target = match write_back {
            WriteBack::Store => &self.store,
            WriteBack::Cache => &self.cache,
        };
        if let Some(target) = target {
            target.put(text, &vector)?;
        }

        Ok(vector)
    }
}

/// Relevance percentage for a distance, always within `[0, 100]`.
pub fn relevance(distance: f32) -> f32 {
    let score = (1.0 - distance) * 100.0;
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// Semantic FAQ search over one corpus.
///
/// Build with [`FaqHandler::new`], feed it with [`FaqHandler::add_config`],
/// then share it read-only; `search` takes `&self` and is safe to call from
/// many threads.
pub struct FaqHandler {
    embedder: Embedder,
    index: HnswIndex<FaqEntry>,
    registry: LazyRegistry<FaqEntry, Vec<f32>>,
    distance: DistanceFn,
    mode: IngestMode,
    dictionary: Option<ExactMatchDictionary>,
    pool: Option<rayon::ThreadPool>,
}

impl FaqHandler {
    pub fn new(
        encoder: Arc<dyn VectorEncoder>,
        store: Option<Arc<dyn EmbeddingStore>>,
        cache: Option<Arc<dyn EmbeddingStore>>,
        params: HnswParams,
        distance: DistanceFn,
        random: SeededRandom,
        mode: IngestMode,
    ) -> Self {
        let embedder = Embedder {
            encoder,
            store,
            cache,
        };

        // Every handle the handler creates is resolved up front, so this
        // fallback only runs for handles wrapped outside of it.
        let resolver = embedder.clone();
        let registry = LazyRegistry::new(move |entry: &FaqEntry| {
            resolver
                .resolve(mode.embedded_text(entry), WriteBack::Store)
                .unwrap_or_else(|e| {
                    log::error!("Failed to resolve embedding for {:?}: {}", entry.question, e);
                    vec![0.0; resolver.encoder.dimension()]
                })
        });

        Self {
            embedder,
            index: HnswIndex::new(params, distance.clone(), random),
            registry,
            distance,
            mode,
            dictionary: None,
            pool: None,
        }
    }

    pub fn with_dictionary(mut self, dictionary: ExactMatchDictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Encode corpus entries on a dedicated pool of `threads` workers.
    ///
    /// Without it ingestion uses rayon's global pool.
    pub fn with_parallelism(mut self, threads: usize) -> Result<Self, FaqError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| FaqError::Internal(format!("Failed to build encoder pool: {}", e)))?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.encoder.dimension()
    }

    /// Embed and index a batch of entries.
    ///
    /// Embeddings are resolved in parallel; graph insertion keeps the input
    /// order so the same corpus and seed always give the same graph.
    pub fn add_items<I>(&mut self, entries: I) -> Result<usize, FaqError>
    where
        I: IntoIterator<Item = FaqEntry>,
    {
        let entries: Vec<FaqEntry> = entries.into_iter().collect();
        if entries.is_empty() {
            return Ok(0);
        }

        log::info!("Embedding {} FAQ entries", entries.len());
        let vectors = self.resolve_corpus(&entries)?;

        let count = entries.len();
        let items = entries
            .into_iter()
            .zip(vectors)
            .map(|(entry, vector)| self.registry.wrap_resolved(entry, vector))
            .collect();
        self.index.add_items(items)?;

        log::info!("Indexed {} FAQ entries ({} total)", count, self.index.len());

        Ok(count)
    }

    /// Resolve corpus vectors in parallel, in input order.
    fn resolve_corpus(&self, entries: &[FaqEntry]) -> Result<Vec<Vec<f32>>, FaqError> {
        let embedder = &self.embedder;
        let mode = self.mode;
        let resolve_all = || {
            entries
                .par_iter()
                .map(|entry| embedder.resolve(mode.embedded_text(entry), WriteBack::Store))
                .collect::<Result<Vec<_>, _>>()
        };
        match &self.pool {
            Some(pool) => pool.install(resolve_all),
            None => resolve_all(),
        }
    }

    /// Index the corpus according to the ingestion mode.
    pub fn add_config(&mut self, config: &FaqConfig) -> Result<usize, FaqError> {
        match self.mode {
            IngestMode::QuestionToQuestion => self.add_items(config.qa_entries()),
            IngestMode::QuestionToAnswer => self.add_items(config.answer_entries()),
        }
    }

    /// Answer `query` with up to `response_count` distinct answers.
    pub fn search(
        &self,
        query: &str,
        response_count: usize,
    ) -> Result<Vec<FaqResponseEntry>, FaqError> {
        if query.trim().is_empty() {
            return Err(FaqError::InvalidQuery("question must not be blank".to_string()));
        }

        let query: String = query.chars().take(MAX_QUERY_LENGTH).collect();
        let count = response_count.clamp(MIN_RESPONSES, MAX_RESPONSES);

        let mut responses = self.semantic_search(&query, count)?;

        if let Some(hit) = self.dictionary.as_ref().and_then(|d| d.search(&query)) {
            log::debug!("Exact match for {:?}: {}", query, hit.title);
            responses.retain(|r| r.text != hit.answer);
            responses.insert(0, FaqResponseEntry::from_entry(hit, 100.0));
            responses.truncate(count);
        }

        Ok(responses)
    }

    fn semantic_search(&self, query: &str, count: usize) -> Result<Vec<FaqResponseEntry>, FaqError> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.resolve(query, WriteBack::Cache)?;

        let k = match self.mode {
            IngestMode::QuestionToQuestion if count > 1 => SEARCH_AMOUNT,
            _ => count,
        };
        let hits = self.index.search(&vector, k)?;

        // closest hit per answer
        let mut best: HashMap<&str, (f32, &FaqEntry)> = HashMap::new();
        for hit in &hits {
            let entry = hit.item.key();
            best.entry(entry.answer.as_str())
                .and_modify(|current| {
                    if hit.distance < current.0 {
                        *current = (hit.distance, entry);
                    }
                })
                .or_insert((hit.distance, entry));
        }

        let mut ranked: Vec<(f32, &FaqEntry)> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.title.cmp(&b.1.title))
                .then_with(|| a.1.answer.cmp(&b.1.answer))
        });
        ranked.truncate(count);

        Ok(ranked
            .into_iter()
            .map(|(distance, entry)| FaqResponseEntry::from_entry(entry, relevance(distance)))
            .collect())
    }

    /// Key-only snapshot of the current graph.
    pub fn snapshot(&self) -> IndexSnapshot<FaqEntry> {
        self.index.snapshot()
    }

    /// Replace the graph with a previously taken snapshot.
    ///
    /// Every vector is fetched again through the store (or encoder) before the
    /// graph is swapped in; on error the current graph stays untouched.
    pub fn restore(
        &mut self,
        snapshot: IndexSnapshot<FaqEntry>,
        random: SeededRandom,
    ) -> Result<(), FaqError> {
        if let Some(got) = snapshot.dimension {
            let expected = self.dimension();
            if got != expected {
                return Err(FaqError::DimensionMismatch { expected, got });
            }
        }

        let keys: Vec<FaqEntry> = snapshot.nodes.iter().map(|node| node.key.clone()).collect();
        let mut vectors = self.resolve_corpus(&keys)?.into_iter();

        let registry = &self.registry;
        let index = HnswIndex::restore_with(snapshot, self.distance.clone(), random, |key| {
            vectors
                .next()
                .map(|vector| registry.wrap_resolved(key, vector))
                .ok_or_else(|| FaqError::Internal("snapshot has more nodes than vectors".to_string()))
        })?;

        log::info!("Restored {} FAQ entries from snapshot", index.len());
        self.index = index;
        Ok(())
    }
}
