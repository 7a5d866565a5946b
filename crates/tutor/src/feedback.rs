use serde::{Deserialize, Serialize};
use strumlight_domain::{ChordShape, StatusVector, StringFret, StringStatus, STRING_COUNT};

/// How an open string reported as untouched is judged.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OpenStringRule {
    /// `NoNote` on an open string counts as correct; the sensor cannot
    /// always confirm an unfretted string.
    #[default]
    TolerateNoNote,
    RequireCorrect,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub per_string: StatusVector,
    pub all_correct: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FeedbackInterpreter {
    open_strings: OpenStringRule,
}

impl FeedbackInterpreter {
    pub fn new(open_strings: OpenStringRule) -> Self {
        Self { open_strings }
    }

    /// `None` when the string does not count towards the chord.
    pub fn string_correct(&self, target: StringFret, status: StringStatus) -> Option<bool> {
        match target {
            StringFret::Muted => None,
            StringFret::Fretted(_) => Some(status == StringStatus::Correct),
            StringFret::Open => Some(match self.open_strings {
                OpenStringRule::TolerateNoNote => {
                    matches!(status, StringStatus::Correct | StringStatus::NoNote)
                }
                OpenStringRule::RequireCorrect => status == StringStatus::Correct,
            }),
        }
    }

    pub fn evaluate(&self, target: &ChordShape, statuses: &StatusVector) -> Verdict {
        let all_correct = target
            .strings()
            .iter()
            .zip(statuses)
            .filter_map(|(fret, status)| self.string_correct(*fret, *status))
            .all(|correct| correct);
        Verdict {
            per_string: *statuses,
            all_correct,
        }
    }

    /// Used when the target is not in the catalog: every string must report
    /// `Correct` for the chord to count.
    pub fn evaluate_without_shape(&self, statuses: &StatusVector) -> Verdict {
        Verdict {
            per_string: *statuses,
            all_correct: statuses.iter().all(|status| *status == StringStatus::Correct),
        }
    }
}

/// Statuses a perfect performance of `shape` would produce.
pub fn perfect_statuses(shape: &ChordShape) -> StatusVector {
    let mut statuses = [StringStatus::NoNote; STRING_COUNT];
    for (status, fret) in statuses.iter_mut().zip(shape.strings()) {
        if fret.is_sounding() {
            *status = StringStatus::Correct;
        }
    }
    statuses
}
