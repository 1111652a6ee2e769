//! Embedding reuse across restarts.

use std::path::Path;
use std::sync::Arc;

use super::{shop_corpus, BagOfWordsEncoder};
use crate::semantic::{
    DistanceMetric, EmbeddingStore, FaqHandler, HnswParams, IngestMode, RocksDbStore,
    SeededRandom, VectorEncoder,
};

fn open_handler(path: &Path, encoder: Arc<BagOfWordsEncoder>) -> (FaqHandler, Arc<RocksDbStore>) {
    let store = Arc::new(RocksDbStore::open(path, &encoder.fingerprint()).unwrap());
    let mut handler = FaqHandler::new(
        encoder,
        Some(store.clone()),
        None,
        HnswParams::default(),
        DistanceMetric::Cosine.distance_fn(),
        SeededRandom::new(42),
        IngestMode::QuestionToQuestion,
    );
    handler.add_config(&shop_corpus()).unwrap();
    (handler, store)
}

#[test]
fn test_restart_reuses_stored_embeddings() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("embedding_cache");
    let entries = shop_corpus().qa_entries().count();

    let first = Arc::new(BagOfWordsEncoder::new(64));
    let (handler, store) = open_handler(&path, first.clone());
    assert_eq!(first.calls(), entries);
    assert_eq!(store.count().unwrap(), entries);
    let before = handler.search("when will my items ship", 5).unwrap();
    drop(handler);
    drop(store);

    let second = Arc::new(BagOfWordsEncoder::new(64));
    let (handler, _store) = open_handler(&path, second.clone());
    assert_eq!(second.calls(), 0);

    let after = handler.search("when will my items ship", 5).unwrap();
    assert_eq!(second.calls(), 1);
    assert_eq!(before, after);
}

#[test]
fn test_new_encoder_invalidates_stored_embeddings() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("embedding_cache");
    let entries = shop_corpus().qa_entries().count();

    let (handler, store) = open_handler(&path, Arc::new(BagOfWordsEncoder::new(64)));
    drop(handler);
    drop(store);

    // different dimension, different fingerprint
    let other = Arc::new(BagOfWordsEncoder::new(48));
    let (handler, store) = open_handler(&path, other.clone());
    assert_eq!(other.calls(), entries);
    assert_eq!(store.count().unwrap(), entries);
    assert_eq!(store.get("when do my items ship").unwrap().map(|v| v.len()), Some(48));

    let results = handler.search("when do my items ship", 5).unwrap();
    assert_eq!(results[0].text, "Items ship in 2 weeks.");
}
