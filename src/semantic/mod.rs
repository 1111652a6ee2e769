//! Semantic search over the FAQ corpus.
//!
//! # Architecture
//!
//! - `encoder`: text to vector, fastembed or remote HTTP backend
//! - `store`: persistent embedding store with encoder fingerprinting
//! - `lazy`: deferred vectors the index holds instead of raw data
//! - `distance`: cosine distance variants
//! - `hnsw`: approximate nearest-neighbour graph
//! - `service`: the FAQ search pipeline on top of all of the above

pub mod distance;
pub mod encoder;
pub mod hnsw;
pub mod lazy;
pub mod service;
pub mod store;

pub use distance::{DistanceFn, DistanceMetric};
pub use encoder::{ApiEncoder, EncodeError, FastEmbedEncoder, VectorEncoder};
pub use hnsw::{HnswIndex, HnswParams, IndexError, NeighbourHeuristic, SeededRandom};
pub use lazy::{LazyRegistry, LazyValue};
pub use service::{FaqError, FaqHandler, IngestMode, MAX_RESPONSES, MIN_RESPONSES};
pub use store::{EmbeddingStore, MemoryStore, RocksDbStore, StoreError};
