//! Substring keyword matching shared by the router, the agents' sub-intent
//! classifiers and the confidence heuristic.
//!
//! All matching is case-insensitive on the message side: callers either pass
//! raw text to the `*_in` helpers or lower-case once and use the `*_lower`
//! variants when scoring several sets against the same message.

/// A fixed set of lower-case terms.
#[derive(Debug, Clone, Copy)]
pub struct KeywordSet(pub &'static [&'static str]);

impl KeywordSet {
    /// Number of distinct terms that occur as substrings of `lowered`.
    pub fn count_lower(&self, lowered: &str) -> usize {
        self.0.iter().filter(|term| lowered.contains(*term)).count()
    }

    pub fn any_lower(&self, lowered: &str) -> bool {
        self.0.iter().any(|term| lowered.contains(term))
    }

    pub fn count_in(&self, text: &str) -> usize {
        self.count_lower(&text.to_lowercase())
    }

    pub fn any_in(&self, text: &str) -> bool {
        self.any_lower(&text.to_lowercase())
    }

    pub fn terms(&self) -> &'static [&'static str] {
        self.0
    }
}

/// Ordered first-match classifier: the first rule whose set hits wins,
/// otherwise `default`.
#[derive(Debug, Clone, Copy)]
pub struct IntentTable<T: Copy + 'static> {
    rules: &'static [(T, KeywordSet)],
    default: T,
}

impl<T: Copy + 'static> IntentTable<T> {
    pub const fn new(rules: &'static [(T, KeywordSet)], default: T) -> Self {
        Self { rules, default }
    }

    pub fn classify(&self, text: &str) -> T {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|(_, set)| set.any_lower(&lowered))
            .map(|(intent, _)| *intent)
            .unwrap_or(self.default)
    }
}
