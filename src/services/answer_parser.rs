use std::collections::BTreeMap;

use thiserror::Error;

use crate::db::types::QuestionPart;
use crate::schemas::answers::{Choice, PartCounts, TruthRow};
use crate::services::answer_text::{
    canonical_line, compact_truth_row, truth_value, AnswerGrammar, LineKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ParseError {
    #[error("malformed section {section}: {reason}")]
    MalformedSection { section: String, reason: &'static str },
    #[error("{part} line {line}: {reason} (got {text:?})")]
    MalformedLine { part: QuestionPart, line: usize, text: String, reason: &'static str },
    #[error("{part} line {line}: question {number} {reason}")]
    QuestionIndex { part: QuestionPart, line: usize, number: u32, reason: &'static str },
    #[error("answer grammar is unavailable: {0}")]
    Grammar(String),
}

/// Answers keyed by declared question number. Coverage of `1..=count` is checked at sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParsedAnswers {
    pub(crate) part1: BTreeMap<u32, Choice>,
    pub(crate) part2: BTreeMap<u32, TruthRow>,
    pub(crate) part3: BTreeMap<u32, String>,
}

struct Section<'a> {
    part: QuestionPart,
    marker_line: usize,
    lines: Vec<(usize, &'a str)>,
}

/// Parses a sectioned answer blob. Every part with a non-zero count needs its marker and
/// at least one line; text before the first marker is ignored.
pub(crate) fn parse_answer_document(
    text: &str,
    counts: &PartCounts,
) -> Result<ParsedAnswers, ParseError> {
    let grammar = grammar()?;
    let mut sections: Vec<Section<'_>> = Vec::with_capacity(3);

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let Some(line) = canonical_line(raw) else {
            continue;
        };

        match grammar.classify(line) {
            LineKind::Marker(part) => {
                if let Some(previous) = sections.iter().find(|section| section.part == part) {
                    return Err(ParseError::MalformedSection {
                        section: format!(
                            "{part} (lines {} and {line_no})",
                            previous.marker_line
                        ),
                        reason: "marker appears more than once",
                    });
                }
                sections.push(Section { part, marker_line: line_no, lines: Vec::new() });
            }
            LineKind::UnknownMarker => {
                return Err(ParseError::MalformedSection {
                    section: format!("{line:?} (line {line_no})"),
                    reason: "unrecognised section marker",
                });
            }
            LineKind::Indexed { .. } | LineKind::Unindexed => {
                if let Some(current) = sections.last_mut() {
                    current.lines.push((line_no, line));
                }
            }
        }
    }

    for part in QuestionPart::ALL {
        if counts.get(part) == 0 {
            continue;
        }
        match sections.iter().find(|section| section.part == part) {
            None => {
                return Err(ParseError::MalformedSection {
                    section: part.to_string(),
                    reason: "marker is missing",
                });
            }
            Some(section) if section.lines.is_empty() => {
                return Err(ParseError::MalformedSection {
                    section: format!("{part} (line {})", section.marker_line),
                    reason: "section has no answers",
                });
            }
            Some(_) => {}
        }
    }

    let mut parsed = ParsedAnswers::default();
    for section in &sections {
        parse_section(grammar, section.part, &section.lines, &mut parsed)?;
    }

    tracing::debug!(
        part1 = parsed.part1.len(),
        part2 = parsed.part2.len(),
        part3 = parsed.part3.len(),
        "parsed answer document"
    );

    Ok(parsed)
}

/// Parses the lines of one part typed without section markers.
pub(crate) fn parse_part_lines(part: QuestionPart, text: &str) -> Result<ParsedAnswers, ParseError> {
    let grammar = grammar()?;
    let mut lines = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let Some(line) = canonical_line(raw) else {
            continue;
        };
        if matches!(grammar.classify(line), LineKind::Marker(_) | LineKind::UnknownMarker) {
            return Err(ParseError::MalformedSection {
                section: format!("{part} (line {})", idx + 1),
                reason: "section markers are not allowed in single-part input",
            });
        }
        lines.push((idx + 1, line));
    }

    let mut parsed = ParsedAnswers::default();
    parse_section(grammar, part, &lines, &mut parsed)?;
    Ok(parsed)
}

fn grammar() -> Result<&'static AnswerGrammar, ParseError> {
    AnswerGrammar::get().map_err(|err| ParseError::Grammar(err.to_string()))
}

fn parse_section(
    grammar: &AnswerGrammar,
    part: QuestionPart,
    lines: &[(usize, &str)],
    parsed: &mut ParsedAnswers,
) -> Result<(), ParseError> {
    let mut seen: BTreeMap<u32, usize> = BTreeMap::new();

    for &(line_no, line) in lines {
        let malformed = |reason: &'static str| ParseError::MalformedLine {
            part,
            line: line_no,
            text: line.to_string(),
            reason,
        };

        let (number, payload) = match grammar.classify(line) {
            LineKind::Indexed { number, payload } => (number, payload),
            _ => return Err(malformed("expected a question number followed by an answer")),
        };

        if number == 0 {
            return Err(ParseError::QuestionIndex {
                part,
                line: line_no,
                number,
                reason: "is not a valid question number",
            });
        }
        if let Some(first) = seen.insert(number, line_no) {
            tracing::debug!(%part, number, first_line = first, line = line_no, "duplicate question");
            return Err(ParseError::QuestionIndex {
                part,
                line: line_no,
                number,
                reason: "appears more than once",
            });
        }
        if payload.is_empty() {
            return Err(malformed("answer is missing"));
        }

        match part {
            QuestionPart::Part1 => {
                let choice = parse_choice(payload).ok_or_else(|| malformed("expected one of A, B, C, D"))?;
                parsed.part1.insert(number, choice);
            }
            QuestionPart::Part2 => {
                let row = parse_truth_row(payload)
                    .ok_or_else(|| malformed("expected four true/false values"))?;
                parsed.part2.insert(number, row);
            }
            QuestionPart::Part3 => {
                parsed.part3.insert(number, payload.to_string());
            }
        }
    }

    Ok(())
}

fn parse_choice(payload: &str) -> Option<Choice> {
    let mut tokens = payload.split_whitespace();
    let token = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }

    let letter = token.trim_matches(|c: char| matches!(c, '(' | ')' | '.' | '[' | ']'));
    let mut chars = letter.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Choice::from_letter(first)
}

fn parse_truth_row(payload: &str) -> Option<TruthRow> {
    let tokens: Vec<&str> = payload
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|token| !token.is_empty())
        .collect();

    if let [single] = tokens.as_slice() {
        return compact_truth_row(single);
    }
    if tokens.len() != 4 {
        return None;
    }

    let mut row = [false; 4];
    for (slot, token) in row.iter_mut().zip(tokens) {
        *slot = truth_value(token)?;
    }
    Some(row)
}
