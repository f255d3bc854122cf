use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "examsubject", rename_all = "snake_case")]
pub(crate) enum Subject {
    Math,
    Physics,
    Chemistry,
    Biology,
    History,
    Geography,
    CivicEducation,
    English,
    ForeignLanguage,
}

impl Subject {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::Biology => "biology",
            Self::History => "history",
            Self::Geography => "geography",
            Self::CivicEducation => "civic_education",
            Self::English => "english",
            Self::ForeignLanguage => "foreign_language",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questionpart", rename_all = "lowercase")]
pub(crate) enum QuestionPart {
    Part1,
    Part2,
    Part3,
}

impl QuestionPart {
    pub(crate) const ALL: [QuestionPart; 3] = [Self::Part1, Self::Part2, Self::Part3];

    pub(crate) fn ordinal(self) -> u8 {
        match self {
            Self::Part1 => 1,
            Self::Part2 => 2,
            Self::Part3 => 3,
        }
    }
}

impl std::fmt::Display for QuestionPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PART{}", self.ordinal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "submissionstate", rename_all = "snake_case")]
pub(crate) enum SubmissionState {
    NotStarted,
    InProgress,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "lockstate", rename_all = "lowercase")]
pub(crate) enum LockState {
    Unlocked,
    Locked,
}
