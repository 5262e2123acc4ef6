use unicode_segmentation::UnicodeSegmentation;

use super::lexicon::Lexicon;
use super::tokenize::Sentence;

/// A lexicon phrase occurrence, before header validation.
///
/// Spans are byte offsets into the document. Candidates coming out of
/// [`find_candidates`] are sorted by `start` and never overlap.
#[derive(Debug, Clone)]
pub struct HeaderCandidate {
    pub category: String,
    /// Registration order of the category, used for tie-breaking.
    pub order: usize,
    pub start: usize,
    pub end: usize,
    /// Span of the enclosing sentence, for the validator's context check.
    pub sentence_start: usize,
    pub sentence_end: usize,
}

struct CompiledPhrase<'a> {
    category: &'a str,
    order: usize,
    tokens: Vec<String>,
}

/// Find every lexicon phrase occurrence on token boundaries, case-insensitively.
///
/// Overlaps are resolved longest-match-first; equal spans fall back to category
/// registration order. Output is ascending by start offset.
pub fn find_candidates(
    text: &str,
    sentences: &[Sentence],
    lexicon: &Lexicon,
) -> Vec<HeaderCandidate> {
    let phrases: Vec<CompiledPhrase> = lexicon
        .entries()
        .map(|e| CompiledPhrase {
            category: e.category,
            order: e.order,
            tokens: e.phrase.unicode_words().map(str::to_string).collect(),
        })
        .filter(|p| !p.tokens.is_empty())
        .collect();
    if phrases.is_empty() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for sentence in sentences {
        let folded: Vec<String> = sentence
            .tokens
            .iter()
            .map(|t| text[t.start..t.end].to_lowercase())
            .collect();

        for i in 0..sentence.tokens.len() {
            for phrase in &phrases {
                let k = phrase.tokens.len();
                if i + k > sentence.tokens.len() {
                    continue;
                }
                if folded[i..i + k] == phrase.tokens[..] {
                    matches.push(HeaderCandidate {
                        category: phrase.category.to_string(),
                        order: phrase.order,
                        start: sentence.tokens[i].start,
                        end: sentence.tokens[i + k - 1].end,
                        sentence_start: sentence.start,
                        sentence_end: sentence.end,
                    });
                }
            }
        }
    }

    // Ascending start; same start prefers the longer span, then the
    // earlier-registered category.
    matches.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.end.cmp(&a.end))
            .then(a.order.cmp(&b.order))
    });

    // Drop anything overlapping an already-kept match.
    let mut kept: Vec<HeaderCandidate> = Vec::with_capacity(matches.len());
    for m in matches {
        if kept.last().map_or(true, |prev| m.start >= prev.end) {
            kept.push(m);
        }
    }
    kept
}

// ── Tests ──
