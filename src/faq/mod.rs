//! FAQ corpus model.
//!
//! The corpus lives in `faq_config.json`, shared with the bot and the web
//! front end, so field names follow that file format.

pub mod config_file;
pub mod dict;

use serde::{Deserialize, Serialize};

pub use config_file::FaqConfigError;
pub use dict::ExactMatchDictionary;

/// The whole corpus as stored on disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaqConfig {
    #[serde(default)]
    pub faqs: Vec<FaqRecord>,
}

/// One curated FAQ topic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaqRecord {
    pub title: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    /// Only answer literal hits, never show up in semantic results.
    #[serde(default)]
    pub exact_only: bool,
}

/// A single indexable (title, question, answer) triple.
///
/// Doubles as the index key: the graph can be snapshotted and restored by
/// entry alone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaqEntry {
    pub title: String,
    pub question: String,
    pub answer: String,
}

impl FaqEntry {
    pub fn new(
        title: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// One ranked answer as returned to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqResponseEntry {
    /// Similarity in `[0, 100]`.
    pub relevance: f32,
    pub matched_question: String,
    pub title: String,
    pub text: String,
}

impl FaqResponseEntry {
    pub fn from_entry(entry: &FaqEntry, relevance: f32) -> Self {
        Self {
            relevance,
            matched_question: entry.question.clone(),
            title: entry.title.clone(),
            text: entry.answer.clone(),
        }
    }
}

impl FaqRecord {
    fn variants(&self) -> impl Iterator<Item = &String> {
        self.keywords.iter().chain(self.questions.iter())
    }
}

impl FaqConfig {
    /// Every keyword and question of every semantically indexed record.
    pub fn qa_entries(&self) -> impl Iterator<Item = FaqEntry> + '_ {
        self.faqs
            .iter()
            .filter(|record| !record.exact_only)
            .flat_map(|record| {
                record
                    .variants()
                    .map(move |q| FaqEntry::new(&record.title, q, &record.answer))
            })
    }

    /// One entry per semantically indexed record, matched by its title.
    pub fn answer_entries(&self) -> impl Iterator<Item = FaqEntry> + '_ {
        self.faqs
            .iter()
            .filter(|record| !record.exact_only)
            .map(|record| FaqEntry::new(&record.title, &record.title, &record.answer))
    }

    /// Title, keywords and questions of every record, `exact_only` included.
    pub fn dict_entries(&self) -> impl Iterator<Item = FaqEntry> + '_ {
        self.faqs.iter().flat_map(|record| {
            std::iter::once(&record.title)
                .chain(record.variants())
                .map(move |q| FaqEntry::new(&record.title, q, &record.answer))
        })
    }
}
