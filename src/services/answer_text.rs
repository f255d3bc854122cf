//! Line-level vocabulary of answer documents: section markers, question labels,
//! true/false spellings and Part III comparison normalisation.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::config::ShortAnswerMatch;
use crate::db::types::QuestionPart;
use crate::schemas::answers::AnswerKeySet;

/// Accepted spellings of the three section markers, consulted in order.
const SECTION_MARKERS: &[(&str, QuestionPart)] = &[
    (r"(?i)^\[\s*(?:part|section|ph[aàáảãạăằắẳẵặâầấẩẫậ]\p{M}*n)\s*[-_.]?\s*(?:1|i)\s*\]$", QuestionPart::Part1),
    (r"(?i)^\[\s*(?:part|section|ph[aàáảãạăằắẳẵặâầấẩẫậ]\p{M}*n)\s*[-_.]?\s*(?:2|ii)\s*\]$", QuestionPart::Part2),
    (r"(?i)^\[\s*(?:part|section|ph[aàáảãạăằắẳẵặâầấẩẫậ]\p{M}*n)\s*[-_.]?\s*(?:3|iii)\s*\]$", QuestionPart::Part3),
];

/// Anything opening like a marker; lines matching this but none of the table are rejected.
const MARKER_PREFIX: &str = r"(?i)^\[\s*(?:part|section|ph[aàáảãạăằắẳẵặâầấẩẫậ]\p{M}*n)";

/// `<label><index><sep><payload>`. A dash only separates when followed by whitespace,
/// so negative Part III answers survive.
const INDEXED_LINE: &str = r"^(?:[\p{L}\p{M}#]+\.?\s*)?(\d+)\s*(?:[.:)]|-\s)?\s*(.*)$";

const TRUE_TOKENS: &[&str] = &["đ", "d", "t", "true", "đúng", "dung", "y", "yes"];
const FALSE_TOKENS: &[&str] = &["s", "f", "false", "sai", "n", "no"];

/// Single-letter truth spellings allowed in the compact `ĐSSĐ` row form.
const COMPACT_TRUTH_LETTERS: &[char] = &['đ', 'd', 't', 's', 'f'];

pub(crate) struct AnswerGrammar {
    markers: Vec<(Regex, QuestionPart)>,
    marker_prefix: Regex,
    indexed_line: Regex,
}

/// What a canonical line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineKind<'a> {
    Marker(QuestionPart),
    UnknownMarker,
    Indexed { number: u32, payload: &'a str },
    Unindexed,
}

static GRAMMAR: OnceLock<Result<AnswerGrammar, regex::Error>> = OnceLock::new();

impl AnswerGrammar {
    pub(crate) fn get() -> Result<&'static AnswerGrammar, regex::Error> {
        GRAMMAR.get_or_init(Self::compile).as_ref().map_err(Clone::clone)
    }

    fn compile() -> Result<Self, regex::Error> {
        let markers = SECTION_MARKERS
            .iter()
            .map(|(pattern, part)| Regex::new(pattern).map(|regex| (regex, *part)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            markers,
            marker_prefix: Regex::new(MARKER_PREFIX)?,
            indexed_line: Regex::new(INDEXED_LINE)?,
        })
    }

    pub(crate) fn classify<'a>(&self, line: &'a str) -> LineKind<'a> {
        if let Some(part) = self.section_marker(line) {
            return LineKind::Marker(part);
        }
        if self.marker_prefix.is_match(line) {
            return LineKind::UnknownMarker;
        }
        match self.split_indexed(line) {
            Some((number, payload)) => LineKind::Indexed { number, payload },
            None => LineKind::Unindexed,
        }
    }

    pub(crate) fn section_marker(&self, line: &str) -> Option<QuestionPart> {
        self.markers.iter().find(|(regex, _)| regex.is_match(line)).map(|(_, part)| *part)
    }

    /// Splits a label-prefixed line into its declared number and trimmed payload.
    pub(crate) fn split_indexed<'a>(&self, line: &'a str) -> Option<(u32, &'a str)> {
        let captures = self.indexed_line.captures(line)?;
        let number = captures.get(1)?.as_str().parse::<u32>().ok()?;
        let payload = captures.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        Some((number, payload))
    }
}

/// Trims a raw line and drops invisible characters word processors leave behind.
pub(crate) fn canonical_line(raw: &str) -> Option<&str> {
    let line = raw.trim_matches(|c: char| c.is_whitespace() || is_invisible(c));
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}')
}

/// Maps one true/false spelling to its value; dots are ignored (`Đ.` reads as `Đ`).
pub(crate) fn truth_value(token: &str) -> Option<bool> {
    let folded: String = token.trim().to_lowercase().chars().filter(|c| *c != '.').collect();
    if TRUE_TOKENS.contains(&folded.as_str()) {
        return Some(true);
    }
    if FALSE_TOKENS.contains(&folded.as_str()) {
        return Some(false);
    }
    None
}

/// Reads `ĐSSĐ`-style rows written without separators.
pub(crate) fn compact_truth_row(token: &str) -> Option<[bool; 4]> {
    let letters: Vec<char> = token.to_lowercase().chars().filter(|c| *c != '.').collect();
    if letters.len() != 4 || !letters.iter().all(|c| COMPACT_TRUTH_LETTERS.contains(c)) {
        return None;
    }

    let mut row = [false; 4];
    for (slot, letter) in row.iter_mut().zip(letters) {
        *slot = truth_value(&letter.to_string())?;
    }
    Some(row)
}

/// Comparison form of a Part III answer. The stored key keeps the author's spelling.
pub(crate) fn normalize_short_answer(text: &str, mode: ShortAnswerMatch) -> String {
    let kept = text.chars().filter(|c| match mode {
        ShortAnswerMatch::Whitespace => !c.is_whitespace(),
        ShortAnswerMatch::Alphanumeric => c.is_alphanumeric(),
    });
    kept.flat_map(char::to_lowercase).collect()
}

/// Renders keys in the sectioned text format the parser reads.
pub(crate) fn render_answer_document(keys: &AnswerKeySet) -> String {
    let mut out = String::new();

    out.push_str("[PART1]\n");
    for (idx, choice) in keys.part1.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, choice));
    }

    out.push_str("\n[PART2]\n");
    for (idx, row) in keys.part2.iter().enumerate() {
        let tokens: Vec<&str> = row.iter().map(|value| if *value { "Đ" } else { "S" }).collect();
        out.push_str(&format!("{}. {}\n", idx + 1, tokens.join(" ")));
    }

    out.push_str("\n[PART3]\n");
    for (idx, answer) in keys.part3.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, answer));
    }

    out
}
