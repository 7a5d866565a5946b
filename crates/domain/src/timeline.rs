use serde::{Deserialize, Serialize};

use crate::catalog::ChordCatalog;
use crate::chord::ChordId;
use crate::DomainError;

/// One target chord scheduled within a practice timeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChordEvent {
    pub chord: ChordId,
    /// Milliseconds from the start of the session.
    pub start_ms: u64,
    /// Milliseconds the chord stays the target.
    pub duration_ms: u64,
    /// Finger to highlight as a hint, 1 (index) through 4 (pinky).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finger: Option<u8>,
}

impl ChordEvent {
    pub fn new(chord: ChordId, start_ms: u64, duration_ms: u64) -> Self {
        Self {
            chord,
            start_ms,
            duration_ms,
            finger: None,
        }
    }

    pub fn with_finger(mut self, finger: u8) -> Self {
        self.finger = Some(finger);
        self
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

/// Ordered, non-overlapping list of chord events. Never mutated once built.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<ChordEvent>", into = "Vec<ChordEvent>")]
pub struct Timeline {
    events: Vec<ChordEvent>,
}

impl Timeline {
    pub fn new(events: Vec<ChordEvent>) -> Result<Self, DomainError> {
        let mut sorted = events;
        sorted.sort_by_key(|event| event.start_ms);
        for event in &sorted {
            if event.duration_ms == 0 {
                return Err(DomainError::validation(format!(
                    "{} at {} ms has zero duration",
                    event.chord, event.start_ms
                )));
            }
            if event.start_ms.checked_add(event.duration_ms).is_none() {
                return Err(DomainError::validation(format!(
                    "{} at {} ms runs past the end of the clock",
                    event.chord, event.start_ms
                )));
            }
            if let Some(finger) = event.finger {
                if !(1..=4).contains(&finger) {
                    return Err(DomainError::validation(format!(
                        "finger hint {finger} for {} must be between 1 and 4",
                        event.chord
                    )));
                }
            }
        }
        for pair in sorted.windows(2) {
            if pair[1].start_ms < pair[0].end_ms() {
                return Err(DomainError::validation(format!(
                    "{} at {} ms overlaps {} ending at {} ms",
                    pair[1].chord,
                    pair[1].start_ms,
                    pair[0].chord,
                    pair[0].end_ms()
                )));
            }
        }
        Ok(Self { events: sorted })
    }

    pub fn events(&self) -> &[ChordEvent] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&ChordEvent> {
        self.events.get(index)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// End of the last event; the natural length of the song.
    pub fn total_ms(&self) -> u64 {
        self.events.last().map(ChordEvent::end_ms).unwrap_or(0)
    }

    /// Silence between event `index` and the one after it.
    pub fn gap_after(&self, index: usize) -> u64 {
        match (self.events.get(index), self.events.get(index + 1)) {
            (Some(current), Some(next)) => next.start_ms.saturating_sub(current.end_ms()),
            _ => 0,
        }
    }

    /// Distinct chords in order of first appearance.
    pub fn chords(&self) -> Vec<&ChordId> {
        let mut seen: Vec<&ChordId> = Vec::new();
        for event in &self.events {
            if !seen.iter().any(|known| known.matches(&event.chord)) {
                seen.push(&event.chord);
            }
        }
        seen
    }

    pub fn missing_chords(&self, catalog: &ChordCatalog) -> Vec<&ChordId> {
        self.chords()
            .into_iter()
            .filter(|chord| !catalog.contains(chord))
            .collect()
    }
}

impl TryFrom<Vec<ChordEvent>> for Timeline {
    type Error = DomainError;

    fn try_from(events: Vec<ChordEvent>) -> Result<Self, Self::Error> {
        Self::new(events)
    }
}

impl From<Timeline> for Vec<ChordEvent> {
    fn from(timeline: Timeline) -> Self {
        timeline.events
    }
}
