//! Query expansion for scripts written without word separators
//!
//! Thai text has no whitespace between words, so an utterance typed with
//! stray spaces or padded with high-frequency function words can miss
//! passages an embedding would otherwise match. Expansion issues a few
//! mechanical rewrites alongside the original.

/// Produces query variants from one utterance
pub trait QueryExpansionStrategy: Send + Sync {
    /// Ordered variants. The first element is always the utterance verbatim;
    /// later elements are never blank and never repeat an earlier one.
    fn expand(&self, utterance: &str) -> Vec<String>;
}

/// Whitespace removal plus function-word stripping
#[derive(Debug, Clone)]
pub struct ThaiQueryExpander {
    function_words: Vec<String>,
}

impl ThaiQueryExpander {
    pub fn new(function_words: Vec<String>) -> Self {
        let function_words = function_words
            .into_iter()
            .filter(|w| !w.trim().is_empty())
            .collect();
        Self { function_words }
    }

    fn without_whitespace(utterance: &str) -> String {
        utterance.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn without_function_words(&self, utterance: &str) -> String {
        let stripped = self
            .function_words
            .iter()
            .fold(utterance.to_string(), |text, word| text.replace(word.as_str(), ""));
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for ThaiQueryExpander {
    fn default() -> Self {
        Self::new(vec!["การ".to_string(), "ค่า".to_string(), "ใน".to_string()])
    }
}

impl QueryExpansionStrategy for ThaiQueryExpander {
    fn expand(&self, utterance: &str) -> Vec<String> {
        let mut variants = vec![utterance.to_string()];

        for candidate in [
            Self::without_whitespace(utterance),
            self.without_function_words(utterance),
        ] {
            if candidate.trim().is_empty() || variants.contains(&candidate) {
                continue;
            }
            variants.push(candidate);
        }

        variants
    }
}
