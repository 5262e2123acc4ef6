use unicode_segmentation::UnicodeSegmentation;

/// A word token as a byte span into the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
}

/// A sentence as a byte span into the original text, plus its word tokens.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
    pub tokens: Vec<Token>,
}

/// Sentence-splitting collaborator. Injected into the engine so workers own
/// their instance and tests control segmentation directly.
pub trait Tokenizer {
    fn sentences(&self, text: &str) -> Vec<Sentence>;
}

/// Default tokenizer on UAX #29 sentence and word boundaries. Newlines are
/// sentence breaks, which matches the line-oriented layout of BSV text.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeTokenizer;

impl Tokenizer for UnicodeTokenizer {
    fn sentences(&self, text: &str) -> Vec<Sentence> {
        text.split_sentence_bound_indices()
            .map(|(offset, sent)| Sentence {
                start: offset,
                end: offset + sent.len(),
                tokens: sent
                    .unicode_word_indices()
                    .map(|(i, word)| Token {
                        start: offset + i,
                        end: offset + i + word.len(),
                    })
                    .collect(),
            })
            .collect()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_index_the_original_text() {
        let text = "Colza :\nPeu de ravageurs.";
        let sentences = UnicodeTokenizer.sentences(text);
        for s in &sentences {
            assert!(s.end <= text.len());
            for t in &s.tokens {
                assert!(t.start >= s.start && t.end <= s.end);
                assert!(!text[t.start..t.end].trim().is_empty());
            }
        }
        // Sentences tile the whole input.
        let mut cursor = 0;
        for s in &sentences {
            assert_eq!(s.start, cursor);
            cursor = s.end;
        }
        assert_eq!(cursor, text.len());
    }

    #[test]
    fn newline_is_a_sentence_break() {
        let sentences = UnicodeTokenizer.sentences("Colza\nTournesol");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].end, 6); // includes the newline
    }

    #[test]
    fn accented_words_keep_byte_offsets() {
        let text = "Altise des crucifères";
        let sentences = UnicodeTokenizer.sentences(text);
        let words: Vec<&str> = sentences[0]
            .tokens
            .iter()
            .map(|t| &text[t.start..t.end])
            .collect();
        assert_eq!(words, vec!["Altise", "des", "crucifères"]);
    }

    #[test]
    fn punctuation_is_not_a_token() {
        let text = "Analyse du risque :";
        let sentences = UnicodeTokenizer.sentences(text);
        assert_eq!(sentences[0].tokens.len(), 3);
    }

    #[test]
    fn empty_input() {
        assert!(UnicodeTokenizer.sentences("").is_empty());
    }
}
