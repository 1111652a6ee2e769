//! Exact-match shortcut checked before semantic search.

use std::collections::HashMap;

use super::FaqEntry;

/// Normalised text to entry lookup.
///
/// When two entries normalise to the same key the later one wins.
#[derive(Clone, Debug, Default)]
pub struct ExactMatchDictionary {
    entries: HashMap<String, FaqEntry>,
    strip_non_letters: bool,
}

impl ExactMatchDictionary {
    pub fn new(strip_non_letters: bool) -> Self {
        Self {
            entries: HashMap::new(),
            strip_non_letters,
        }
    }

    /// Build from `(title, matched text, answer)` entries.
    pub fn from_entries<I>(entries: I, strip_non_letters: bool) -> Self
    where
        I: IntoIterator<Item = FaqEntry>,
    {
        let mut dict = Self::new(strip_non_letters);
        for entry in entries {
            dict.insert(entry);
        }
        dict
    }

    pub fn insert(&mut self, entry: FaqEntry) {
        let key = self.normalize(&entry.question);
        if key.is_empty() {
            return;
        }
        self.entries.insert(key, entry);
    }

    pub fn search(&self, query: &str) -> Option<&FaqEntry> {
        self.entries.get(&self.normalize(query))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn normalize(&self, text: &str) -> String {
        let folded = text.trim().to_lowercase();
        if self.strip_non_letters {
            folded.chars().filter(|c| c.is_alphabetic()).collect()
        } else {
            folded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_trimmed_and_case_folded() {
        let dict = ExactMatchDictionary::from_entries(
            vec![FaqEntry::new("Shipping", "When do my items ship", "2 weeks")],
            false,
        );
        let hit = dict.search("  when DO my items SHIP ").unwrap();
        assert_eq!(hit.answer, "2 weeks");
        assert_eq!(hit.question, "When do my items ship");
        assert!(dict.search("when do my items ship?").is_none());
    }

    #[test]
    fn test_strip_non_letters() {
        let dict = ExactMatchDictionary::from_entries(
            vec![FaqEntry::new("Shipping", "When do my items ship?", "2 weeks")],
            true,
        );
        assert!(dict.search("whendomyitemsship").is_some());
        assert!(dict.search("when do my items ship!!").is_some());
    }

    #[test]
    fn test_last_write_wins() {
        let dict = ExactMatchDictionary::from_entries(
            vec![
                FaqEntry::new("First", "refund", "first answer"),
                FaqEntry::new("Second", "Refund ", "second answer"),
            ],
            false,
        );
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.search("refund").unwrap().title, "Second");
    }

    #[test]
    fn test_blank_keys_ignored() {
        let dict = ExactMatchDictionary::from_entries(
            vec![FaqEntry::new("Odd", "???", "answer")],
            true,
        );
        assert!(dict.is_empty());
        assert!(dict.search("").is_none());
    }
}
