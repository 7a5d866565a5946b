use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::chord::ChordId;
use crate::timeline::{ChordEvent, Timeline};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PracticeStatistics {
    pub average_accuracy: f32,
    pub best_streak: u32,
    pub sessions: u32,
    pub last_practiced: Option<OffsetDateTime>,
}

impl PracticeStatistics {
    pub fn new() -> Self {
        Self {
            average_accuracy: 0.0,
            best_streak: 0,
            sessions: 0,
            last_practiced: None,
        }
    }
}

impl Default for PracticeStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub difficulty: Difficulty,
    pub tempo_bpm: u16,
    pub time_signature: (u8, u8),
    pub timeline: Timeline,
    #[serde(default)]
    pub stats: PracticeStatistics,
}

impl Song {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        difficulty: Difficulty,
        tempo_bpm: u16,
        timeline: Timeline,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            difficulty,
            tempo_bpm,
            time_signature: (4, 4),
            timeline,
            stats: PracticeStatistics::new(),
        }
    }

    pub fn chords(&self) -> Vec<&ChordId> {
        self.timeline.chords()
    }
}

/// Builds a contiguous timeline from `(chord, duration_ms, finger)` steps.
fn progression(steps: &[(&str, u64, u8)]) -> Timeline {
    let mut start_ms = 0;
    let mut events = Vec::with_capacity(steps.len());
    for (chord, duration_ms, finger) in steps {
        let chord = ChordId::parse(chord).expect("built-in chord names are valid");
        events.push(ChordEvent::new(chord, start_ms, *duration_ms).with_finger(*finger));
        start_ms += duration_ms;
    }
    Timeline::new(events).expect("built-in timelines are valid")
}

/// Demo songs bundled with the app.
pub fn builtin_songs() -> Vec<Song> {
    let wagon_wheel: [(&str, u64, u8); 4] = [
        ("G_Major", 4000, 1),
        ("D_Major", 4000, 2),
        ("E_Minor", 4000, 2),
        ("C_Major", 4000, 1),
    ];
    let smoke: [(&str, u64, u8); 3] = [
        ("G_Major", 3000, 1),
        ("Bb_Major", 3000, 3),
        ("C_Major", 3000, 3),
    ];
    let sweet_child: [(&str, u64, u8); 4] = [
        ("D_Major", 4000, 1),
        ("C_Major", 4000, 2),
        ("G_Major", 4000, 3),
        ("A_Major", 4000, 2),
    ];

    vec![
        Song::new(
            "wagon-wheel",
            "Wagon Wheel",
            "Old Crow Medicine Show",
            Difficulty::Beginner,
            120,
            progression(&[wagon_wheel, wagon_wheel].concat()),
        ),
        Song::new(
            "smoke-on-the-water",
            "Smoke on the Water",
            "Deep Purple",
            Difficulty::Beginner,
            115,
            progression(&[smoke, smoke].concat()),
        ),
        Song::new(
            "sweet-child-o-mine",
            "Sweet Child O' Mine",
            "Guns N' Roses",
            Difficulty::Intermediate,
            126,
            progression(&[sweet_child, sweet_child].concat()),
        ),
    ]
}

pub fn find_builtin(id: &str) -> Option<Song> {
    builtin_songs().into_iter().find(|song| song.id == id)
}
