pub mod clean;
pub mod lexicon;
pub mod matcher;
pub mod segment;
pub mod tokenize;
pub mod validate;

use thiserror::Error;
use tracing::warn;

use lexicon::Lexicon;
use segment::{AcceptedHeader, StructuredDocument};
use tokenize::Tokenizer;
use validate::HeaderValidator;

/// Internal-consistency failures of the segmentation engine. Heuristic
/// misclassifications are not errors; this only covers programming-error
/// conditions that must not corrupt output silently.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("header span at offset {offset} precedes cursor {cursor}: matcher emitted out-of-order or overlapping spans")]
    OrderingViolation { offset: usize, cursor: usize },
}

/// Four-pass pipeline over one cleaned bulletin:
/// tokenize → match phrases → validate headers → accumulate sections.
pub fn extract_structure<T: Tokenizer>(
    text: &str,
    tokenizer: &T,
    lexicon: &Lexicon,
    validator: &HeaderValidator,
) -> Result<StructuredDocument, EngineError> {
    if text.trim().is_empty() {
        return Ok(StructuredDocument::new());
    }
    if lexicon.is_empty() {
        warn!("lexicon has no phrases; whole document will land in the general bucket");
    }

    let sentences = tokenizer.sentences(text);
    let candidates = matcher::find_candidates(text, &sentences, lexicon);

    let accepted: Vec<AcceptedHeader> = candidates
        .iter()
        .filter(|c| validator.is_header(&text[c.sentence_start..c.sentence_end]))
        .map(|c| AcceptedHeader::from_candidate(text, c))
        .collect();

    segment::accumulate(text, &accepted)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use lexicon::{CATEGORY_CROP, CATEGORY_RISK, CATEGORY_TOPIC};
    use segment::{GENERAL_CONTEXT, GENERAL_TOPIC, RISK_TOPIC};
    use tokenize::UnicodeTokenizer;

    fn bsv_lexicon() -> Lexicon {
        let mut lex = Lexicon::new();
        lex.register(CATEGORY_CROP, ["Colza", "Tournesol", "Soja"]);
        lex.register(CATEGORY_TOPIC, ["Altise", "Limaces", "Pucerons"]);
        lex.register(CATEGORY_RISK, ["Analyse du risque"]);
        lex
    }

    fn run(text: &str) -> StructuredDocument {
        extract_structure(text, &UnicodeTokenizer, &bsv_lexicon(), &HeaderValidator::default())
            .unwrap()
    }

    #[test]
    fn two_crops_with_general_content() {
        let doc = run("Colza :\nPeu de ravageurs.\n\nTournesol :\nNe pas récolter trop tôt.");
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["COLZA", "TOURNESOL"]);
        assert_eq!(doc["COLZA"][GENERAL_TOPIC], vec!["Peu de ravageurs.".to_string()]);
        assert_eq!(
            doc["TOURNESOL"][GENERAL_TOPIC],
            vec!["Ne pas récolter trop tôt.".to_string()]
        );
    }

    #[test]
    fn topic_and_risk_sections_under_one_crop() {
        let doc = run(
            "Colza\nAltise des crucifères\nDescription courte.\nAnalyse du risque :\nRisque faible.",
        );
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["COLZA"]);
        assert_eq!(
            doc["COLZA"]["ALTISE DES CRUCIFÈRES"],
            vec!["Description courte.".to_string()]
        );
        assert_eq!(doc["COLZA"][RISK_TOPIC], vec!["Risque faible.".to_string()]);
    }

    #[test]
    fn document_without_any_known_phrase() {
        let doc = run("Rien de connu ici.\nJuste du texte libre.");
        assert_eq!(doc.len(), 1);
        assert_eq!(
            doc[GENERAL_CONTEXT][GENERAL_TOPIC],
            vec!["Rien de connu ici.\nJuste du texte libre.".to_string()]
        );
    }

    #[test]
    fn empty_document_yields_empty_structure() {
        assert!(run("").is_empty());
        assert!(run(" \n \n").is_empty());
    }

    #[test]
    fn crop_mention_in_long_prose_does_not_switch_sections() {
        let text = "Colza :\nDébut de campagne.\nCette semaine les parcelles de tournesol \
                    observées dans le réseau montrent un état sanitaire satisfaisant sans \
                    dégât notable de ravageurs ni maladie.";
        let doc = run(text);
        // The long sentence mentions "tournesol" but stays under COLZA.
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["COLZA"]);
        assert_eq!(doc["COLZA"][GENERAL_TOPIC].len(), 1);
        assert!(doc["COLZA"][GENERAL_TOPIC][0].contains("tournesol"));
    }

    #[test]
    fn topic_does_not_leak_across_crops() {
        let text = "Colza\nLimaces\nDégâts observés.\nTournesol\nRas.";
        let doc = run(text);
        assert_eq!(doc["COLZA"]["LIMACES"], vec!["Dégâts observés.".to_string()]);
        assert_eq!(doc["TOURNESOL"].keys().collect::<Vec<_>>(), vec![GENERAL_TOPIC]);
    }

    #[test]
    fn every_content_character_lands_in_exactly_one_block() {
        let text = "Intro libre.\nColza :\nBloc un.\nLimaces\nBloc deux.\nTournesol\nBloc trois.";
        let doc = run(text);
        let blocks: Vec<&String> = doc.values().flat_map(|t| t.values()).flatten().collect();
        // Each block is a verbatim slice of the input, and no two blocks overlap.
        let mut cursor = 0;
        for b in &blocks {
            let at = text[cursor..].find(b.as_str()).map(|i| cursor + i);
            assert!(at.is_some(), "block not found in order: {b:?}");
            cursor = at.unwrap() + b.len();
        }
        // Nothing but headers and whitespace is missing from the blocks.
        let header_lines = ["Colza :", "Limaces", "Tournesol"];
        let mut residue = text.to_string();
        for b in &blocks {
            residue = residue.replacen(b.as_str(), "", 1);
        }
        for h in header_lines {
            residue = residue.replacen(h, "", 1);
        }
        assert!(residue.trim().is_empty(), "unaccounted text: {residue:?}");
    }

    #[test]
    fn reruns_are_deterministic() {
        let text = "Colza\nAltise\nDescription.\nAnalyse du risque :\nFaible.\nSoja\nRas.";
        let a = serde_json::to_string(&run(text)).unwrap();
        let b = serde_json::to_string(&run(text)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sample_bulletin_fixture() {
        let text = std::fs::read_to_string("tests/fixtures/bsv_sample.txt").unwrap();
        let doc = run(&text);
        assert!(doc.contains_key("COLZA"));
        assert!(doc.contains_key("TOURNESOL"));
        let colza = &doc["COLZA"];
        assert!(colza.contains_key(GENERAL_TOPIC));
        assert!(colza.contains_key(RISK_TOPIC));
        assert!(colza.contains_key("LIMACES"));
        // Risk analysis content stays with its crop.
        assert!(colza[RISK_TOPIC][0].contains("risque est faible"));
    }
}
