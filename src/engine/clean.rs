use std::sync::LazyLock;

use regex::Regex;

// OCR/PDF artifacts specific to the DRAAF bulletin layout.
static LONE_PAGE_NUMBERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+[ \t]*$").unwrap());
static RUNNING_HEADERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:Grandes cultures n° \d+ du \d+ \d+ \d+|N°\d+ du \d{2}/\d{2}/\d{4})[ \t]*\n")
        .unwrap()
});
static HYPHEN_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+)-\n\s*(\w+)").unwrap());
static BULLETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^•[ \t]*").unwrap());
static MULTI_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static BROKEN_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zàâäéèêëïîôöùûüÿç,;])\n([a-zàâäéèêëïîôöùûüÿç])").unwrap()
});
static BLANK_WITH_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]+\n").unwrap());
static EXCESS_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Before/after counters for one cleaning run.
#[derive(Debug, Clone, Copy)]
pub struct CleanStats {
    pub lines_before: usize,
    pub lines_after: usize,
    pub chars_before: usize,
    pub chars_after: usize,
}

impl CleanStats {
    pub fn reduction_pct(&self) -> f64 {
        if self.chars_before == 0 {
            return 0.0;
        }
        (self.chars_before - self.chars_after) as f64 / self.chars_before as f64 * 100.0
    }
}

/// Normalize a raw extracted bulletin into clean prose: strip page numbers and
/// repeated running headers, re-join hyphenated and broken lines, normalize
/// bullets, collapse spacing. Structure (paragraphs, header lines) is kept.
pub fn clean_text(raw: &str) -> (String, CleanStats) {
    let passes: &[(&Regex, &str)] = &[
        (&LONE_PAGE_NUMBERS, ""),
        (&RUNNING_HEADERS, ""),
        (&HYPHEN_BREAKS, "$1$2"),
        (&BULLETS, "- "),
        (&MULTI_SPACES, " "),
        (&BROKEN_LINES, "$1 $2"),
        (&BLANK_WITH_SPACES, "\n"),
        (&EXCESS_BLANK_LINES, "\n\n"),
    ];

    let mut text = raw.to_string();
    for (re, replacement) in passes {
        text = re.replace_all(&text, *replacement).into_owned();
    }

    let cleaned = text.trim().to_string();
    let stats = CleanStats {
        lines_before: raw.matches('\n').count(),
        lines_after: cleaned.matches('\n').count(),
        chars_before: raw.len(),
        chars_after: cleaned.len(),
    };
    (cleaned, stats)
}

// ── Tests ──
