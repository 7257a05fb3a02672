use serde::Serialize;

/// Lowest score that still counts as a pass (the D boundary).
pub const PASSING_SCORE: f64 = 60.0;
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassStatus {
    NotAssessed,
    Passed,
    Failed,
}

impl PassStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PassStatus::NotAssessed => "not_assessed",
            PassStatus::Passed => "passed",
            PassStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_assessed" => Some(PassStatus::NotAssessed),
            "passed" => Some(PassStatus::Passed),
            "failed" => Some(PassStatus::Failed),
            _ => None,
        }
    }
}

/// Everything shown next to a score, derived from it once at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    pub letter: Option<&'static str>,
    pub label: Option<&'static str>,
    pub pass_status: PassStatus,
}

// Ordered high to low; first threshold the score reaches wins.
const BANDS: [(f64, &str, &str); 4] = [
    (90.0, "A", "Sangat Baik"),
    (80.0, "B", "Baik"),
    (70.0, "C", "Cukup"),
    (60.0, "D", "Kurang"),
];
const BOTTOM_BAND: (&str, &str) = ("E", "Sangat Kurang");

pub fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score)
}

pub fn letter_and_label(score: f64) -> (&'static str, &'static str) {
    for (min, letter, label) in BANDS {
        if score >= min {
            return (letter, label);
        }
    }
    BOTTOM_BAND
}

pub fn derive(score: Option<f64>) -> Derived {
    match score {
        None => Derived {
            letter: None,
            label: None,
            pass_status: PassStatus::NotAssessed,
        },
        Some(v) => {
            let (letter, label) = letter_and_label(v);
            Derived {
                letter: Some(letter),
                label: Some(label),
                pass_status: if v >= PASSING_SCORE {
                    PassStatus::Passed
                } else {
                    PassStatus::Failed
                },
            }
        }
    }
}
