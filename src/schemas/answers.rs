use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::types::QuestionPart;

/// Part I option letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) enum Choice {
    A,
    B,
    C,
    D,
}

impl Choice {
    pub(crate) fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            _ => None,
        }
    }

    pub(crate) fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Four true/false sub-statements of a Part II question.
pub(crate) type TruthRow = [bool; 4];

/// Canonical key of one question, tagged by part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "part", content = "key", rename_all = "lowercase")]
pub(crate) enum AnswerKey {
    Part1(Choice),
    Part2(TruthRow),
    Part3(String),
}

/// Ordered keys of a paper; index `i` holds question `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AnswerKeySet {
    #[serde(default)]
    pub(crate) part1: Vec<Choice>,
    #[serde(default)]
    pub(crate) part2: Vec<TruthRow>,
    #[serde(default)]
    pub(crate) part3: Vec<String>,
}

impl AnswerKeySet {
    pub(crate) fn counts(&self) -> PartCounts {
        PartCounts {
            part1: self.part1.len() as u32,
            part2: self.part2.len() as u32,
            part3: self.part3.len() as u32,
        }
    }

    /// Yields `(part, number, key)` in part then question order.
    pub(crate) fn iter_keys(&self) -> impl Iterator<Item = (QuestionPart, u32, AnswerKey)> + '_ {
        let part1 = self
            .part1
            .iter()
            .enumerate()
            .map(|(idx, choice)| (QuestionPart::Part1, idx as u32 + 1, AnswerKey::Part1(*choice)));
        let part2 = self
            .part2
            .iter()
            .enumerate()
            .map(|(idx, row)| (QuestionPart::Part2, idx as u32 + 1, AnswerKey::Part2(*row)));
        let part3 = self.part3.iter().enumerate().map(|(idx, text)| {
            (QuestionPart::Part3, idx as u32 + 1, AnswerKey::Part3(text.clone()))
        });
        part1.chain(part2).chain(part3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PartCounts {
    pub(crate) part1: u32,
    pub(crate) part2: u32,
    pub(crate) part3: u32,
}

impl PartCounts {
    pub(crate) fn get(&self, part: QuestionPart) -> u32 {
        match part {
            QuestionPart::Part1 => self.part1,
            QuestionPart::Part2 => self.part2,
            QuestionPart::Part3 => self.part3,
        }
    }
}

impl Default for PartCounts {
    fn default() -> Self {
        Self { part1: 40, part2: 8, part3: 6 }
    }
}

/// A candidate's sheet, keyed by question number. Missing entries are unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CandidateAnswers {
    #[serde(default)]
    pub(crate) part1: BTreeMap<u32, Choice>,
    #[serde(default)]
    pub(crate) part2: BTreeMap<u32, [Option<bool>; 4]>,
    #[serde(default)]
    pub(crate) part3: BTreeMap<u32, String>,
}
