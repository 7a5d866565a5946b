//! Text grammar spoken with the fretboard.
//!
//! Outbound: `SHOW:<root>_<quality>_CHORD` and `CAPO:<n>`.
//! Inbound: `CHORD:<label>;STATUS:<string>:<status>,...` where strings absent
//! from the status list did not sound.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use strumlight_domain::{ChordId, DomainError, GuitarString, StatusVector, StringStatus, STRING_COUNT};

const SHOW_PREFIX: &str = "SHOW:";
const SHOW_SUFFIX: &str = "_CHORD";
const CAPO_PREFIX: &str = "CAPO:";
const CHORD_HEADER: &str = "CHORD:";
const STATUS_HEADER: &str = "STATUS:";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("frame {0:?} is missing its chord section")]
    MissingChord(String),
    #[error("frame {0:?} is missing its status section")]
    MissingStatus(String),
    #[error("unrecognised command {0:?}")]
    UnknownCommand(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    ShowChord(ChordId),
    Capo(u8),
}

impl Command {
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn to_frame(&self) -> Vec<u8> {
        self.encode().into_bytes()
    }

    /// Parses a command as the device would; used by simulated devices.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(frame).map_err(|_| DecodeError::InvalidUtf8)?;
        let unknown = || DecodeError::UnknownCommand(text.to_string());
        if let Some(body) = text.strip_prefix(SHOW_PREFIX) {
            let name = body.strip_suffix(SHOW_SUFFIX).ok_or_else(unknown)?;
            let chord = ChordId::parse(name).map_err(|_| unknown())?;
            return Ok(Command::ShowChord(chord));
        }
        if let Some(fret) = text.strip_prefix(CAPO_PREFIX) {
            return fret.parse().map(Command::Capo).map_err(|_| unknown());
        }
        Err(unknown())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ShowChord(chord) => write!(
                f,
                "{SHOW_PREFIX}{}_{}{SHOW_SUFFIX}",
                chord.root(),
                chord.compact_quality()
            ),
            Command::Capo(fret) => write!(f, "{CAPO_PREFIX}{fret}"),
        }
    }
}

/// A decoded status frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub chord_label: String,
    pub statuses: StatusVector,
}

impl Notification {
    pub fn new(chord_label: impl Into<String>, statuses: StatusVector) -> Self {
        Self {
            chord_label: chord_label.into(),
            statuses,
        }
    }

    pub fn chord(&self) -> Result<ChordId, DomainError> {
        ChordId::parse(&self.chord_label)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(frame).map_err(|_| DecodeError::InvalidUtf8)?;
        let (chord_part, status_part) = text
            .split_once(';')
            .ok_or_else(|| DecodeError::MissingStatus(text.to_string()))?;

        let chord_label = strip_header(chord_part.trim(), CHORD_HEADER).trim();
        if chord_label.is_empty() {
            return Err(DecodeError::MissingChord(text.to_string()));
        }
        let status_part = status_part.trim();
        if status_part.is_empty() {
            return Err(DecodeError::MissingStatus(text.to_string()));
        }

        let mut statuses = [StringStatus::NoNote; STRING_COUNT];
        for entry in strip_header(status_part, STATUS_HEADER).split(',') {
            let Some((name, token)) = entry.split_once(':') else {
                if !entry.trim().is_empty() {
                    trace!(entry, "status entry without separator ignored");
                }
                continue;
            };
            match (GuitarString::from_label(name), status_from_token(token)) {
                (Some(string), Some(status)) => statuses[string.index()] = status,
                _ => trace!(entry, "unrecognised status entry ignored"),
            }
        }

        Ok(Self {
            chord_label: chord_label.to_string(),
            statuses,
        })
    }

    /// Encodes as the device does, omitting strings that did not sound.
    pub fn encode(&self) -> String {
        let entries: Vec<String> = GuitarString::ALL
            .into_iter()
            .zip(self.statuses)
            .filter(|(_, status)| *status != StringStatus::NoNote)
            .map(|(string, status)| format!("{}:{}", string.label(), status_token(status)))
            .collect();
        format!(
            "{CHORD_HEADER}{};{STATUS_HEADER}{}",
            self.chord_label,
            entries.join(",")
        )
    }

    pub fn to_frame(&self) -> Vec<u8> {
        self.encode().into_bytes()
    }
}

fn strip_header<'a>(text: &'a str, header: &str) -> &'a str {
    match text.get(..header.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(header) => &text[header.len()..],
        _ => text,
    }
}

pub fn status_from_token(token: &str) -> Option<StringStatus> {
    let token = token.trim();
    [
        ("CORRECT", StringStatus::Correct),
        ("HIGHER", StringStatus::TooHigh),
        ("LOWER", StringStatus::TooLow),
        ("INCORRECT", StringStatus::Incorrect),
        ("NO_NOTE", StringStatus::NoNote),
    ]
    .into_iter()
    .find(|(name, _)| name.eq_ignore_ascii_case(token))
    .map(|(_, status)| status)
}

pub fn status_token(status: StringStatus) -> &'static str {
    match status {
        StringStatus::NoNote => "NO_NOTE",
        StringStatus::Correct => "CORRECT",
        StringStatus::TooHigh => "HIGHER",
        StringStatus::TooLow => "LOWER",
        StringStatus::Incorrect => "INCORRECT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StringStatus::*;

    #[test]
    fn show_command_strips_quality_whitespace() {
        let chord = ChordId::new("A", "7 sus4").unwrap();
        assert_eq!(Command::ShowChord(chord).encode(), "SHOW:A_7sus4_CHORD");

        let song_chord = ChordId::parse("G_Major").unwrap();
        assert_eq!(Command::ShowChord(song_chord).encode(), "SHOW:G_Major_CHORD");
    }

    #[test]
    fn capo_command_has_no_padding() {
        assert_eq!(Command::Capo(3).encode(), "CAPO:3");
        assert_eq!(Command::decode(b"CAPO:3").unwrap(), Command::Capo(3));
    }

    #[test]
    fn commands_parse_back() {
        let frame = Command::ShowChord(ChordId::parse("Ab/G# Minor").unwrap()).to_frame();
        let Command::ShowChord(chord) = Command::decode(&frame).unwrap() else {
            panic!("expected a show command");
        };
        assert_eq!(chord.to_string(), "Ab/G# Minor");
        assert!(Command::decode(b"SHOW:G_Major").is_err());
        assert!(Command::decode(b"PLAY:1").is_err());
    }

    #[test]
    fn decodes_full_status_frame() {
        let frame = b"CHORD:E Minor;STATUS:LOW E:CORRECT,A:CORRECT,D:CORRECT,G:CORRECT,B:CORRECT,HIGH E:CORRECT";
        let notification = Notification::decode(frame).unwrap();
        assert_eq!(notification.chord_label, "E Minor");
        assert_eq!(notification.statuses, [Correct; STRING_COUNT]);
    }

    #[test]
    fn absent_strings_are_no_note() {
        let notification =
            Notification::decode(b"CHORD: C Major; STATUS: low e:higher,B:LOWER").unwrap();
        assert_eq!(notification.chord_label, "C Major");
        assert_eq!(
            notification.statuses,
            [TooHigh, NoNote, NoNote, NoNote, TooLow, NoNote]
        );
    }

    #[test]
    fn unknown_entries_are_skipped_individually() {
        let notification =
            Notification::decode(b"CHORD:G Major;STATUS:Z:CORRECT,A:MAYBE,D:INCORRECT,junk")
                .unwrap();
        assert_eq!(
            notification.statuses,
            [NoNote, NoNote, Incorrect, NoNote, NoNote, NoNote]
        );
    }

    #[test]
    fn frames_missing_a_half_are_malformed() {
        assert!(matches!(
            Notification::decode(b"CHORD:G Major"),
            Err(DecodeError::MissingStatus(_))
        ));
        assert!(matches!(
            Notification::decode(b"CHORD:G Major;"),
            Err(DecodeError::MissingStatus(_))
        ));
        assert!(matches!(
            Notification::decode(b";STATUS:A:CORRECT"),
            Err(DecodeError::MissingChord(_))
        ));
        assert!(matches!(
            Notification::decode(b"CHORD:;STATUS:A:CORRECT"),
            Err(DecodeError::MissingChord(_))
        ));
        assert_eq!(
            Notification::decode(&[0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn encode_omits_silent_strings() {
        let notification =
            Notification::new("D Major", [NoNote, NoNote, Correct, Correct, TooLow, Correct]);
        let text = notification.encode();
        assert_eq!(
            text,
            "CHORD:D Major;STATUS:D:CORRECT,G:CORRECT,B:LOWER,HIGH E:CORRECT"
        );
        assert_eq!(Notification::decode(text.as_bytes()).unwrap(), notification);
    }
}
