use indexmap::IndexMap;

use super::matcher::HeaderCandidate;
use super::EngineError;

/// Crop bucket for text preceding any crop header.
pub const GENERAL_CONTEXT: &str = "CONTEXTE_GENERAL";
/// Topic bucket for text under a crop but before any topic header.
pub const GENERAL_TOPIC: &str = "General";
/// Topic bucket a risk marker switches to.
pub const RISK_TOPIC: &str = "ANALYSE_RISQUE";

/// Final output: crop label → topic label → content blocks in document order.
/// Insertion-ordered on both levels.
pub type StructuredDocument = IndexMap<String, IndexMap<String, Vec<String>>>;

/// State transition a header category drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRole {
    Crop,
    Topic,
    Risk,
}

impl HeaderRole {
    /// Categories beyond the three standard ones act as sub-section markers;
    /// giving one bespoke transition semantics is a local change here.
    pub fn from_category(name: &str) -> Self {
        if name.eq_ignore_ascii_case("crop") {
            HeaderRole::Crop
        } else if name.eq_ignore_ascii_case("risk") {
            HeaderRole::Risk
        } else {
            HeaderRole::Topic
        }
    }
}

/// A validated header, ready to drive a state transition.
///
/// The consumed span runs from the phrase match to the end of its line, so a
/// header line like `Colza :` or `Altise des crucifères` is swallowed whole
/// instead of leaking its tail into the next content block. The label is the
/// uppercased line text with any trailing colon removed.
#[derive(Debug, Clone)]
pub struct AcceptedHeader {
    pub role: HeaderRole,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

impl AcceptedHeader {
    pub fn from_candidate(text: &str, candidate: &HeaderCandidate) -> Self {
        let line_end = text[candidate.end..]
            .find('\n')
            .map(|i| candidate.end + i)
            .unwrap_or(text.len());
        let label = text[candidate.start..line_end]
            .trim()
            .trim_end_matches(':')
            .trim_end()
            .to_uppercase();
        AcceptedHeader {
            role: HeaderRole::from_category(&candidate.category),
            label,
            start: candidate.start,
            end: line_end,
        }
    }
}

/// Walk accepted headers in order, slicing the text between them into blocks
/// filed under the active (crop, topic) pair.
///
/// Headers are consumed as pure state transitions and never appear as content.
/// A crop change resets the topic to `General`; a risk marker overrides the
/// topic, leaving the crop alone.
pub fn accumulate(
    text: &str,
    headers: &[AcceptedHeader],
) -> Result<StructuredDocument, EngineError> {
    let mut doc = StructuredDocument::new();
    let mut crop = GENERAL_CONTEXT.to_string();
    let mut topic = GENERAL_TOPIC.to_string();
    let mut last_pos = 0usize;

    for h in headers {
        if h.start < last_pos {
            if h.end <= last_pos {
                // Swallowed by the previous header's line extension.
                continue;
            }
            // The matcher guarantees sorted, non-overlapping spans; anything
            // else is an internal bug, not a data condition.
            return Err(EngineError::OrderingViolation {
                offset: h.start,
                cursor: last_pos,
            });
        }

        push_block(&mut doc, &crop, &topic, &text[last_pos..h.start]);

        match h.role {
            HeaderRole::Crop => {
                crop = h.label.clone();
                topic = GENERAL_TOPIC.to_string();
            }
            HeaderRole::Topic => topic = h.label.clone(),
            HeaderRole::Risk => topic = RISK_TOPIC.to_string(),
        }

        last_pos = h.end;
    }

    push_block(&mut doc, &crop, &topic, &text[last_pos..]);
    Ok(doc)
}

fn push_block(doc: &mut StructuredDocument, crop: &str, topic: &str, raw: &str) {
    let content = raw.trim();
    if content.is_empty() {
        return;
    }
    doc.entry(crop.to_string())
        .or_default()
        .entry(topic.to_string())
        .or_default()
        .push(content.to_string());
}

// ── Tests ──
