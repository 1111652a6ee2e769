//! Crate-level scenario tests.
//!
//! Everything here runs offline: [`BagOfWordsEncoder`] stands in for a real
//! model so results are exact and repeatable.

mod persistence;
mod search;

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::faq::{FaqConfig, FaqRecord};
use crate::semantic::{EncodeError, VectorEncoder};

/// Hashes lowercase words into a fixed number of buckets, then normalises.
///
/// Texts sharing words end up close under cosine distance; texts with no
/// words in common are orthogonal unless their buckets collide.
pub struct BagOfWordsEncoder {
    dimension: usize,
    calls: AtomicUsize,
}

impl BagOfWordsEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `encode` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a, stable across runs and platforms
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

impl VectorEncoder for BagOfWordsEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn fingerprint(&self) -> String {
        format!("bag-of-words:{}", self.dimension)
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[self.bucket(word)] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

pub fn record(title: &str, answer: &str, questions: &[&str]) -> FaqRecord {
    FaqRecord {
        title: title.to_string(),
        answer: answer.to_string(),
        keywords: Vec::new(),
        questions: questions.iter().map(|q| q.to_string()).collect(),
        exact_only: false,
    }
}

/// A small shop FAQ with several variants per answer.
pub fn shop_corpus() -> FaqConfig {
    FaqConfig {
        faqs: vec![
            FaqRecord {
                keywords: vec!["shipping".to_string()],
                ..record(
                    "Shipping",
                    "Items ship in 2 weeks.",
                    &[
                        "when do my items ship",
                        "how long does shipping take",
                        "when will my package arrive",
                    ],
                )
            },
            record(
                "Refunds",
                "Email support to request a refund.",
                &["how do i get a refund", "can i get my money back"],
            ),
            record(
                "Payment",
                "We accept cards and bank transfer.",
                &["which payment methods do you accept", "can i pay by card"],
            ),
            record(
                "Account",
                "Reset your password from the login page.",
                &["i forgot my password", "how do i reset my password"],
            ),
            FaqRecord {
                exact_only: true,
                ..record("Discord", "Join us at discord.gg/example.", &["discord invite"])
            },
        ],
    }
}

#[test]
fn test_bag_of_words_is_deterministic_and_normalised() {
    let encoder = BagOfWordsEncoder::new(64);
    let a = encoder.encode("When do my items ship").unwrap();
    let b = encoder.encode("when do MY items ship?").unwrap();
    assert_eq!(a, b);

    let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
    assert_eq!(encoder.calls(), 2);
}
