//! THPTQG 2025 scoring. Points are kept in hundredths so every rule is exact.

use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::config::ShortAnswerMatch;
use crate::db::models::ExamPaper;
use crate::db::types::{QuestionPart, Subject};
use crate::schemas::answers::{CandidateAnswers, PartCounts};
use crate::schemas::paper::paper_counts;
use crate::services::answer_text::normalize_short_answer;

/// Hundredths of a point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Points(i64);

pub(crate) const PART1_UNIT: Points = Points(25);
/// Indexed by the number of correct sub-statements.
pub(crate) const PART2_TABLE: [Points; 5] = [Points(0), Points(10), Points(25), Points(50), Points(100)];
pub(crate) const PART3_UNIT_MATH: Points = Points(50);
pub(crate) const PART3_UNIT_DEFAULT: Points = Points(25);
pub(crate) const NORMALIZED_SCALE: i64 = 10;

impl Points {
    pub(crate) const ZERO: Points = Points(0);

    pub(crate) const fn from_centi(value: i64) -> Self {
        Self(value)
    }

    pub(crate) fn centi(self) -> i64 {
        self.0
    }

    pub(crate) fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Add for Points {
    type Output = Points;

    fn add(self, rhs: Points) -> Points {
        Points(self.0 + rhs.0)
    }
}

impl Sum for Points {
    fn sum<I: Iterator<Item = Points>>(iter: I) -> Points {
        iter.fold(Points::ZERO, Add::add)
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Points((value * 100.0).round() as i64))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QuestionScore {
    pub(crate) part: QuestionPart,
    pub(crate) number: u32,
    pub(crate) correct: bool,
    pub(crate) correct_units: u32,
    pub(crate) total_units: u32,
    pub(crate) points: Points,
    pub(crate) max_points: Points,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PartScore {
    pub(crate) part: QuestionPart,
    pub(crate) correct_units: u32,
    pub(crate) total_units: u32,
    pub(crate) points: Points,
    pub(crate) max_points: Points,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ScoreReport {
    pub(crate) paper_code: String,
    pub(crate) paper_revision: i32,
    pub(crate) questions: Vec<QuestionScore>,
    pub(crate) parts: Vec<PartScore>,
    pub(crate) raw_points: Points,
    pub(crate) max_points: Points,
    /// On the 0-10 scale, two decimals, half-up.
    pub(crate) normalized_score: Points,
}

pub(crate) fn part3_unit(subject: Subject) -> Points {
    match subject {
        Subject::Math => PART3_UNIT_MATH,
        _ => PART3_UNIT_DEFAULT,
    }
}

pub(crate) fn question_max(part: QuestionPart, subject: Subject) -> Points {
    match part {
        QuestionPart::Part1 => PART1_UNIT,
        QuestionPart::Part2 => PART2_TABLE[4],
        QuestionPart::Part3 => part3_unit(subject),
    }
}

pub(crate) fn max_raw_points(counts: &PartCounts, subject: Subject) -> Points {
    QuestionPart::ALL
        .into_iter()
        .map(|part| Points(question_max(part, subject).0 * i64::from(counts.get(part))))
        .sum()
}

/// `raw / max * 10` in hundredths, rounding half up.
pub(crate) fn normalize(raw: Points, max: Points) -> Points {
    if max.0 <= 0 {
        return Points::ZERO;
    }
    let numerator = raw.0.max(0) * NORMALIZED_SCALE * 100;
    Points((2 * numerator + max.0) / (2 * max.0))
}

/// Scores a sheet against a paper's keys. Pure; the same inputs always give the same report.
pub(crate) fn score_sheet(
    paper: &ExamPaper,
    answers: &CandidateAnswers,
    mode: ShortAnswerMatch,
) -> ScoreReport {
    let counts = paper_counts(paper);
    let keys = &paper.answer_key.0;
    let mut questions = Vec::with_capacity((counts.part1 + counts.part2 + counts.part3) as usize);

    for number in 1..=counts.part1 {
        let key = keys.part1.get(number as usize - 1);
        let correct = match (key, answers.part1.get(&number)) {
            (Some(key), Some(given)) => key == given,
            _ => false,
        };
        questions.push(QuestionScore {
            part: QuestionPart::Part1,
            number,
            correct,
            correct_units: u32::from(correct),
            total_units: 1,
            points: if correct { PART1_UNIT } else { Points::ZERO },
            max_points: PART1_UNIT,
        });
    }

    for number in 1..=counts.part2 {
        let key = keys.part2.get(number as usize - 1);
        let matched = match (key, answers.part2.get(&number)) {
            (Some(key), Some(given)) => key
                .iter()
                .zip(given.iter())
                .filter(|(expected, given)| **given == Some(**expected))
                .count(),
            _ => 0,
        };
        questions.push(QuestionScore {
            part: QuestionPart::Part2,
            number,
            correct: matched == 4,
            correct_units: matched as u32,
            total_units: 4,
            points: PART2_TABLE[matched],
            max_points: PART2_TABLE[4],
        });
    }

    let part3_value = part3_unit(paper.subject);
    for number in 1..=counts.part3 {
        let key = keys.part3.get(number as usize - 1);
        let correct = match (key, answers.part3.get(&number)) {
            (Some(key), Some(given)) => {
                let given = normalize_short_answer(given, mode);
                !given.is_empty() && given == normalize_short_answer(key, mode)
            }
            _ => false,
        };
        questions.push(QuestionScore {
            part: QuestionPart::Part3,
            number,
            correct,
            correct_units: u32::from(correct),
            total_units: 1,
            points: if correct { part3_value } else { Points::ZERO },
            max_points: part3_value,
        });
    }

    let parts: Vec<PartScore> = QuestionPart::ALL
        .into_iter()
        .map(|part| {
            let scored = questions.iter().filter(|question| question.part == part);
            PartScore {
                part,
                correct_units: scored.clone().map(|q| q.correct_units).sum(),
                total_units: scored.clone().map(|q| q.total_units).sum(),
                points: scored.clone().map(|q| q.points).sum(),
                max_points: scored.map(|q| q.max_points).sum(),
            }
        })
        .collect();

    let raw_points: Points = parts.iter().map(|part| part.points).sum();
    let max_points = max_raw_points(&counts, paper.subject);

    ScoreReport {
        paper_code: paper.code.clone(),
        paper_revision: paper.revision,
        questions,
        parts,
        raw_points,
        max_points,
        normalized_score: normalize(raw_points, max_points),
    }
}
