use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Number of strings on the instrument.
pub const STRING_COUNT: usize = 6;
/// Highest fret a shape may reference.
pub const MAX_FRET: u8 = 15;
/// Frets shown at once by a chord diagram.
pub const DISPLAYED_FRETS: u8 = 4;

/// Raw LED value the firmware uses for a string that must not sound.
pub const RAW_MUTED: i8 = -1;
/// Raw LED value the firmware uses for an open string.
pub const RAW_OPEN: i8 = 10;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GuitarString {
    LowE,
    A,
    D,
    G,
    B,
    HighE,
}

impl GuitarString {
    /// Low to high pitch, matching the index of every per-string array.
    pub const ALL: [GuitarString; STRING_COUNT] = [
        GuitarString::LowE,
        GuitarString::A,
        GuitarString::D,
        GuitarString::G,
        GuitarString::B,
        GuitarString::HighE,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Label used by the device in status notifications.
    pub fn label(self) -> &'static str {
        match self {
            GuitarString::LowE => "LOW E",
            GuitarString::A => "A",
            GuitarString::D => "D",
            GuitarString::G => "G",
            GuitarString::B => "B",
            GuitarString::HighE => "HIGH E",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|string| string.label().eq_ignore_ascii_case(label))
    }
}

/// Canonical position of one string within a chord shape.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StringFret {
    Muted,
    Open,
    Fretted(u8),
}

impl StringFret {
    /// Translates the firmware LED encoding: `-1` is muted, `10` is open and
    /// anything in `0..=9` is the inverted fret distance `10 - raw`.
    pub fn from_raw(raw: i8) -> Result<Self, DomainError> {
        match raw {
            RAW_MUTED => Ok(StringFret::Muted),
            RAW_OPEN => Ok(StringFret::Open),
            0..=9 => Ok(StringFret::Fretted((RAW_OPEN - raw) as u8)),
            other => Err(DomainError::validation(format!(
                "raw LED value {other} is outside -1..=10"
            ))),
        }
    }

    pub fn fretted(fret: u8) -> Result<Self, DomainError> {
        if (1..=MAX_FRET).contains(&fret) {
            Ok(StringFret::Fretted(fret))
        } else {
            Err(DomainError::validation(format!(
                "fret {fret} must be between 1 and {MAX_FRET}"
            )))
        }
    }

    /// Fret number with open strings reported as `0`.
    pub fn fret(self) -> Option<u8> {
        match self {
            StringFret::Muted => None,
            StringFret::Open => Some(0),
            StringFret::Fretted(fret) => Some(fret),
        }
    }

    pub fn is_sounding(self) -> bool {
        !matches!(self, StringFret::Muted)
    }
}

/// Per-string verdict reported by the device.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StringStatus {
    #[default]
    NoNote,
    Correct,
    TooHigh,
    TooLow,
    Incorrect,
}

/// One status per string, aligned with [`GuitarString::ALL`].
pub type StatusVector = [StringStatus; STRING_COUNT];

/// A chord key such as `"C Major"`, `"G_Major"` or `"Ab/G# 7sus4"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChordId {
    root: String,
    quality: String,
}

impl ChordId {
    pub fn new(root: impl Into<String>, quality: impl Into<String>) -> Result<Self, DomainError> {
        let root = root.into().trim().to_string();
        let quality = quality.into().trim().to_string();
        if root.is_empty() || root.contains(char::is_whitespace) {
            return Err(DomainError::validation(format!(
                "chord root {root:?} must be a single non-empty token"
            )));
        }
        if quality.is_empty() {
            return Err(DomainError::validation(format!(
                "chord {root:?} is missing a quality"
            )));
        }
        Ok(Self { root, quality })
    }

    /// Splits at the first space or underscore: the root never contains either.
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        let text = text.trim();
        let is_separator = |c: char| c == ' ' || c == '_';
        let split = text.find(is_separator).ok_or_else(|| {
            DomainError::validation(format!("chord {text:?} needs a root and a quality"))
        })?;
        let (root, rest) = text.split_at(split);
        Self::new(root, rest.trim_start_matches(is_separator))
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn quality(&self) -> &str {
        &self.quality
    }

    /// Quality with all whitespace removed (`"7 sus4"` becomes `"7sus4"`).
    pub fn compact_quality(&self) -> String {
        self.quality.split_whitespace().collect()
    }

    /// Loose equality used when comparing labels from different sources.
    pub fn matches(&self, other: &ChordId) -> bool {
        self.root == other.root && self.compact_quality() == other.compact_quality()
    }
}

impl fmt::Display for ChordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root, self.quality)
    }
}

impl FromStr for ChordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChordId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChordId> for String {
    fn from(id: ChordId) -> Self {
        id.to_string()
    }
}

/// Range of frets a diagram should draw for a shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FretWindow {
    pub start: u8,
    pub span: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    try_from = "[StringFret; STRING_COUNT]",
    into = "[StringFret; STRING_COUNT]"
)]
pub struct ChordShape {
    strings: [StringFret; STRING_COUNT],
}

impl ChordShape {
    pub fn new(strings: [StringFret; STRING_COUNT]) -> Result<Self, DomainError> {
        for fret in strings {
            if let StringFret::Fretted(fret) = fret {
                StringFret::fretted(fret)?;
            }
        }
        Ok(Self { strings })
    }

    pub fn from_raw(raw: [i8; STRING_COUNT]) -> Result<Self, DomainError> {
        let mut strings = [StringFret::Muted; STRING_COUNT];
        for (slot, value) in strings.iter_mut().zip(raw) {
            *slot = StringFret::from_raw(value)?;
        }
        Ok(Self { strings })
    }

    pub fn strings(&self) -> &[StringFret; STRING_COUNT] {
        &self.strings
    }

    pub fn get(&self, string: GuitarString) -> StringFret {
        self.strings[string.index()]
    }

    pub fn sounding_strings(&self) -> impl Iterator<Item = GuitarString> + '_ {
        GuitarString::ALL
            .into_iter()
            .filter(|string| self.get(*string).is_sounding())
    }

    pub fn fret_window(&self) -> FretWindow {
        let start = self
            .strings
            .iter()
            .filter_map(|fret| match fret {
                StringFret::Fretted(n) => Some(*n),
                _ => None,
            })
            .min()
            .unwrap_or(1);
        FretWindow {
            start,
            span: DISPLAYED_FRETS,
        }
    }
}

impl TryFrom<[StringFret; STRING_COUNT]> for ChordShape {
    type Error = DomainError;

    fn try_from(strings: [StringFret; STRING_COUNT]) -> Result<Self, Self::Error> {
        Self::new(strings)
    }
}

impl From<ChordShape> for [StringFret; STRING_COUNT] {
    fn from(shape: ChordShape) -> Self {
        shape.strings
    }
}

/// Recommended finger per string: 0 for none, 1 (index) through 4 (pinky).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerAssignment([u8; STRING_COUNT]);

impl FingerAssignment {
    pub fn new(fingers: [u8; STRING_COUNT]) -> Result<Self, DomainError> {
        if let Some(bad) = fingers.iter().find(|finger| **finger > 4) {
            return Err(DomainError::validation(format!(
                "finger {bad} must be between 0 and 4"
            )));
        }
        Ok(Self(fingers))
    }

    pub fn get(&self, string: GuitarString) -> Option<u8> {
        match self.0[string.index()] {
            0 => None,
            finger => Some(finger),
        }
    }

    pub fn as_array(&self) -> &[u8; STRING_COUNT] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_convert_to_canonical_frets() {
        assert_eq!(StringFret::from_raw(-1).unwrap(), StringFret::Muted);
        assert_eq!(StringFret::from_raw(10).unwrap(), StringFret::Open);
        assert_eq!(StringFret::from_raw(7).unwrap(), StringFret::Fretted(3));
        assert_eq!(StringFret::from_raw(0).unwrap(), StringFret::Fretted(10));
        assert!(StringFret::from_raw(11).is_err());
        assert!(StringFret::from_raw(-2).is_err());
    }

    #[test]
    fn chord_id_accepts_spaces_and_underscores() {
        let spaced = ChordId::parse("G Major").unwrap();
        let underscored = ChordId::parse("G_Major").unwrap();
        assert_eq!(spaced, underscored);
        assert_eq!(spaced.to_string(), "G Major");

        let sharp = ChordId::parse("Ab/G# 7sus4").unwrap();
        assert_eq!(sharp.root(), "Ab/G#");
        assert_eq!(sharp.quality(), "7sus4");

        assert!(ChordId::parse("C").is_err());
        assert!(ChordId::parse("").is_err());
    }

    #[test]
    fn compact_quality_strips_whitespace() {
        let id = ChordId::new("A", "7 sus4").unwrap();
        assert_eq!(id.compact_quality(), "7sus4");
        assert!(id.matches(&ChordId::parse("A 7sus4").unwrap()));
    }

    #[test]
    fn guitar_string_labels_are_case_insensitive() {
        assert_eq!(GuitarString::from_label("low e"), Some(GuitarString::LowE));
        assert_eq!(GuitarString::from_label(" HIGH E "), Some(GuitarString::HighE));
        assert_eq!(GuitarString::from_label("C"), None);
        assert_eq!(GuitarString::HighE.index(), 5);
    }

    #[test]
    fn fret_window_starts_at_lowest_fretted_string() {
        let barre = ChordShape::from_raw([9, 7, 7, 8, 9, 9]).unwrap();
        assert_eq!(barre.fret_window(), FretWindow { start: 1, span: 4 });

        let high = ChordShape::from_raw([-1, 6, 4, 4, 6, 6]).unwrap();
        assert_eq!(high.fret_window().start, 4);

        let muted = ChordShape::from_raw([RAW_MUTED; STRING_COUNT]).unwrap();
        assert_eq!(muted.fret_window().start, 1);
    }

    #[test]
    fn shapes_keep_fret_bounds_through_serde() {
        let json = r#"[{"Fretted":0},"Open","Open","Open","Open","Open"]"#;
        assert!(serde_json::from_str::<ChordShape>(json).is_err());
        let json = r#"["Muted",{"Fretted":16},"Open","Open","Open","Open"]"#;
        assert!(serde_json::from_str::<ChordShape>(json).is_err());

        let shape = ChordShape::from_raw([-1, 7, 8, 10, 9, 10]).unwrap();
        let json = serde_json::to_string(&shape).unwrap();
        assert_eq!(serde_json::from_str::<ChordShape>(&json).unwrap(), shape);
        assert!(ChordShape::new([StringFret::Fretted(0); STRING_COUNT]).is_err());
    }

    #[test]
    fn finger_assignment_rejects_sixth_finger() {
        assert!(FingerAssignment::new([0, 3, 2, 0, 1, 5]).is_err());
        let fingers = FingerAssignment::new([0, 3, 2, 0, 1, 0]).unwrap();
        assert_eq!(fingers.get(GuitarString::A), Some(3));
        assert_eq!(fingers.get(GuitarString::G), None);
    }
}
