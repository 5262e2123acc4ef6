use serde::Deserialize;

/// Context heuristic separating real section headers from in-sentence mentions.
///
/// A crop or pest name buried in long prose is not a header; a short line, or
/// any line ending in a colon, usually is. The word cutoff is empirical for
/// the DRAAF bulletin layout and deliberately configurable.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HeaderValidator {
    /// Sentences with at least this many words need a colon to count as headers.
    pub max_prose_words: usize,
}

impl Default for HeaderValidator {
    fn default() -> Self {
        Self { max_prose_words: 15 }
    }
}

impl HeaderValidator {
    /// True when the candidate's enclosing sentence looks like a header.
    pub fn is_header(&self, sentence: &str) -> bool {
        sentence.split_whitespace().count() < self.max_prose_words || sentence.contains(':')
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_PROSE: &str = "Les parcelles de colza observées cette semaine dans la \
         région montrent une pression de ravageurs globalement faible malgré quelques captures";

    #[test]
    fn short_sentence_is_a_header() {
        assert!(HeaderValidator::default().is_header("Colza"));
        assert!(HeaderValidator::default().is_header("Altise des crucifères\n"));
    }

    #[test]
    fn long_prose_without_colon_is_rejected() {
        assert!(LONG_PROSE.split_whitespace().count() >= 15);
        assert!(!HeaderValidator::default().is_header(LONG_PROSE));
    }

    #[test]
    fn colon_overrides_length() {
        let with_colon = format!("{} :", LONG_PROSE);
        assert!(HeaderValidator::default().is_header(&with_colon));
    }

    #[test]
    fn cutoff_is_configurable() {
        let strict = HeaderValidator { max_prose_words: 3 };
        assert!(!strict.is_header("Altise des crucifères observée"));
        assert!(strict.is_header("Colza"));
    }
}
