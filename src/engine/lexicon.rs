use serde::Deserialize;

/// A single `(category, phrase)` pair exposed to the matcher.
///
/// `order` is the registration rank of the phrase's category and is the
/// tie-breaker when two categories match overlapping spans.
#[derive(Debug, Clone)]
pub struct LexiconEntry<'a> {
    pub category: &'a str,
    pub phrase: &'a str,
    pub order: usize,
}

/// Header vocabulary grouped by category.
///
/// Categories are plain strings so regional vocabularies (and entirely new
/// categories) come from configuration, not code. Phrases are case-folded at
/// registration; re-registering a category is a set union.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone)]
struct CategoryEntry {
    name: String,
    phrases: Vec<String>,
}

/// Category names carried by the standard BSV configuration.
pub const CATEGORY_CROP: &str = "CROP";
pub const CATEGORY_TOPIC: &str = "TOPIC";
pub const CATEGORY_RISK: &str = "RISK";

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register phrases under a category, preserving first-registration order
    /// of categories. Duplicate phrases (case-insensitively) are ignored.
    pub fn register<I, S>(&mut self, category: &str, phrases: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = match self.categories.iter_mut().find(|c| c.name == category) {
            Some(e) => e,
            None => {
                self.categories.push(CategoryEntry {
                    name: category.to_string(),
                    phrases: Vec::new(),
                });
                self.categories.last_mut().unwrap()
            }
        };
        for phrase in phrases {
            let folded = phrase.as_ref().trim().to_lowercase();
            if folded.is_empty() || entry.phrases.contains(&folded) {
                continue;
            }
            entry.phrases.push(folded);
        }
    }

    /// All `(category, phrase)` pairs, categories in registration order.
    pub fn entries(&self) -> impl Iterator<Item = LexiconEntry<'_>> {
        self.categories.iter().enumerate().flat_map(|(order, cat)| {
            cat.phrases.iter().map(move |p| LexiconEntry {
                category: &cat.name,
                phrase: p,
                order,
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(|c| c.phrases.is_empty())
    }

    /// Categories that carry no phrase at all (misconfiguration worth a warning).
    pub fn empty_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|c| c.phrases.is_empty())
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Config-file shape: `{ "CROP": ["Colza", ...], "TOPIC": [...], "RISK": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct LexiconConfig(pub indexmap::IndexMap<String, Vec<String>>);

impl From<&LexiconConfig> for Lexicon {
    fn from(cfg: &LexiconConfig) -> Self {
        let mut lex = Lexicon::new();
        for (category, phrases) in &cfg.0 {
            lex.register(category, phrases);
        }
        lex
    }
}

// ── Tests ──
