pub mod catalog;
pub mod chord;
pub mod error;
pub mod io;
pub mod song;
pub mod timeline;

pub use crate::catalog::{ChordCatalog, RawChordTable};
pub use crate::chord::{
    ChordId, ChordShape, FingerAssignment, FretWindow, GuitarString, StatusVector, StringFret,
    StringStatus, STRING_COUNT,
};
pub use crate::error::DomainError;
pub use crate::io::{DocumentFormat, TimelineDocument};
pub use crate::song::{builtin_songs, find_builtin, Difficulty, PracticeStatistics, Song};
pub use crate::timeline::{ChordEvent, Timeline};
