//! End-to-end search behaviour over an in-memory corpus.

use std::collections::HashSet;
use std::sync::Arc;

use super::{record, shop_corpus, BagOfWordsEncoder};
use crate::faq::{ExactMatchDictionary, FaqConfig, FaqResponseEntry};
use crate::semantic::{
    DistanceMetric, FaqError, FaqHandler, HnswParams, IngestMode, MemoryStore, SeededRandom,
};

fn handler(config: &FaqConfig, mode: IngestMode) -> FaqHandler {
    let mut handler = FaqHandler::new(
        Arc::new(BagOfWordsEncoder::new(64)),
        None,
        Some(Arc::new(MemoryStore::new())),
        HnswParams::default(),
        DistanceMetric::Cosine.distance_fn(),
        SeededRandom::new(42),
        mode,
    );
    handler.add_config(config).unwrap();
    handler
}

fn with_dictionary(handler: FaqHandler, config: &FaqConfig) -> FaqHandler {
    handler.with_dictionary(ExactMatchDictionary::from_entries(config.dict_entries(), false))
}

fn texts(results: &[FaqResponseEntry]) -> Vec<&str> {
    results.iter().map(|r| r.text.as_str()).collect()
}

#[test]
fn test_shipping_question_finds_shipping_answer() {
    let config = FaqConfig {
        faqs: vec![record(
            "Shipping",
            "Items ship in 2 weeks.",
            &["when do my items ship"],
        )],
    };
    let handler = handler(&config, IngestMode::QuestionToQuestion);

    let results = handler.search("when will my order ship", 5).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "Items ship in 2 weeks.");
    assert_eq!(results[0].title, "Shipping");
    assert!(results[0].relevance > 0.0);
}

#[test]
fn test_empty_index_returns_nothing() {
    let handler = handler(&FaqConfig::default(), IngestMode::QuestionToQuestion);
    assert!(handler.is_empty());
    assert!(handler.search("anything", 5).unwrap().is_empty());
}

#[test]
fn test_results_hold_one_entry_per_answer() {
    let config = shop_corpus();
    let handler = handler(&config, IngestMode::QuestionToQuestion);

    for query in ["when will my items ship", "password", "can i get a refund by card"] {
        let results = handler.search(query, 50).unwrap();
        let unique: HashSet<_> = texts(&results).into_iter().collect();
        assert_eq!(unique.len(), results.len(), "duplicate answers for {query:?}");
    }
}

#[test]
fn test_result_size_is_min_of_count_and_answers() {
    let config = shop_corpus();
    let handler = handler(&config, IngestMode::QuestionToQuestion);

    // exact_only records are never indexed
    assert_eq!(handler.search("shipping", 50).unwrap().len(), 4);
    assert_eq!(handler.search("shipping", 3).unwrap().len(), 3);
    assert_eq!(handler.search("shipping", 1).unwrap().len(), 1);
}

#[test]
fn test_relevance_is_bounded_and_descending() {
    let config = shop_corpus();
    let handler = handler(&config, IngestMode::QuestionToQuestion);

    let results = handler.search("how do i pay for shipping", 10).unwrap();
    assert!(!results.is_empty());
    for entry in &results {
        assert!((0.0..=100.0).contains(&entry.relevance));
    }
    for pair in results.windows(2) {
        assert!(pair[0].relevance >= pair[1].relevance);
    }
}

#[test]
fn test_best_variant_is_reported() {
    let config = shop_corpus();
    let handler = handler(&config, IngestMode::QuestionToQuestion);

    let results = handler.search("how long does shipping take", 5).unwrap();
    assert_eq!(results[0].text, "Items ship in 2 weeks.");
    assert_eq!(results[0].matched_question, "how long does shipping take");
    assert!((results[0].relevance - 100.0).abs() < 1e-3);
}

#[test]
fn test_exact_match_goes_first() {
    let config = shop_corpus();
    let handler = with_dictionary(handler(&config, IngestMode::QuestionToQuestion), &config);

    let results = handler.search("  I FORGOT MY PASSWORD ", 3).unwrap();
    assert_eq!(results[0].relevance, 100.0);
    assert_eq!(results[0].text, "Reset your password from the login page.");
    assert_eq!(results[0].matched_question, "i forgot my password");
    assert!(results.len() <= 3);

    let unique: HashSet<_> = texts(&results).into_iter().collect();
    assert_eq!(unique.len(), results.len());
}

#[test]
fn test_exact_only_record_reachable_by_dictionary() {
    let config = shop_corpus();
    let plain = handler(&config, IngestMode::QuestionToQuestion);
    assert!(!texts(&plain.search("discord invite", 50).unwrap())
        .contains(&"Join us at discord.gg/example."));

    let handler = with_dictionary(handler(&config, IngestMode::QuestionToQuestion), &config);
    let results = handler.search("Discord", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "Join us at discord.gg/example.");
    assert_eq!(results[0].relevance, 100.0);
}

#[test]
fn test_exact_match_on_empty_index() {
    let config = FaqConfig {
        faqs: vec![crate::faq::FaqRecord {
            exact_only: true,
            ..record("Discord", "Join us.", &["discord invite"])
        }],
    };
    let handler = with_dictionary(handler(&config, IngestMode::QuestionToQuestion), &config);
    assert!(handler.is_empty());

    let results = handler.search("discord invite", 5).unwrap();
    assert_eq!(texts(&results), vec!["Join us."]);
}

#[test]
fn test_question_to_answer_mode() {
    let config = shop_corpus();
    let handler = handler(&config, IngestMode::QuestionToAnswer);
    assert_eq!(handler.len(), 4);

    let results = handler.search("refund", 5).unwrap();
    assert_eq!(results[0].text, "Email support to request a refund.");
    assert_eq!(results[0].matched_question, "Refunds");
}

#[test]
fn test_same_seed_same_results() {
    let config = shop_corpus();
    let a = handler(&config, IngestMode::QuestionToQuestion);
    let b = handler(&config, IngestMode::QuestionToQuestion);

    for query in ["when will my items ship", "money back", "card payment", "login"] {
        let ra = a.search(query, 5).unwrap();
        let rb = b.search(query, 5).unwrap();
        assert_eq!(ra, rb, "results differ for {query:?}");
    }
}

#[test]
fn test_concurrent_queries() {
    let config = shop_corpus();
    let handler = Arc::new(handler(&config, IngestMode::QuestionToQuestion));
    let expected = handler.search("how do i reset my password", 5).unwrap();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let handler = handler.clone();
            std::thread::spawn(move || handler.search("how do i reset my password", 5).unwrap())
        })
        .collect();
    for thread in threads {
        assert_eq!(thread.join().unwrap(), expected);
    }
}

#[test]
fn test_parallel_ingestion_matches_sequential() {
    let config = shop_corpus();
    let sequential = handler(&config, IngestMode::QuestionToQuestion);

    let mut parallel = FaqHandler::new(
        Arc::new(BagOfWordsEncoder::new(64)),
        None,
        None,
        HnswParams::default(),
        DistanceMetric::Cosine.distance_fn(),
        SeededRandom::new(42),
        IngestMode::QuestionToQuestion,
    )
    .with_parallelism(4)
    .unwrap();
    parallel.add_config(&config).unwrap();

    assert_eq!(parallel.snapshot(), sequential.snapshot());
}

#[test]
fn test_blank_question_is_invalid() {
    let handler = handler(&shop_corpus(), IngestMode::QuestionToQuestion);
    assert!(matches!(handler.search(" ", 5), Err(FaqError::InvalidQuery(_))));
}
