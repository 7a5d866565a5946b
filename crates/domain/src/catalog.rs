use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chord::{ChordId, ChordShape, FingerAssignment, STRING_COUNT};
use crate::DomainError;

/// Roots the firmware stores under a combined sharp/flat name.
const ENHARMONIC_ROOTS: &[(&str, &str, &str)] = &[
    ("Ab", "G#", "Ab/G#"),
    ("Bb", "A#", "Bb/A#"),
    ("Db", "C#", "Db/C#"),
    ("Eb", "D#", "Eb/D#"),
    ("Gb", "F#", "Gb/F#"),
];

/// Chord table in the firmware's raw LED encoding, as read from a file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RawChordTable {
    pub shapes: BTreeMap<String, [i8; STRING_COUNT]>,
    #[serde(default)]
    pub fingers: BTreeMap<String, [u8; STRING_COUNT]>,
}

/// Read-only mapping from chord key to canonical shape and fingering.
#[derive(Clone, Debug, Default)]
pub struct ChordCatalog {
    shapes: HashMap<String, ChordShape>,
    fingers: HashMap<String, FingerAssignment>,
}

impl ChordCatalog {
    /// Builds a catalog, converting every raw shape once. Keys are stored in
    /// their `"<root> <quality>"` form.
    pub fn from_raw<'a, S, F>(shapes: S, fingers: F) -> Result<Self, DomainError>
    where
        S: IntoIterator<Item = (&'a str, [i8; STRING_COUNT])>,
        F: IntoIterator<Item = (&'a str, [u8; STRING_COUNT])>,
    {
        let mut catalog = Self::default();
        for (name, raw) in shapes {
            let id = ChordId::parse(name)?;
            let shape = ChordShape::from_raw(raw)
                .map_err(|err| DomainError::validation(format!("{name}: {err}")))?;
            catalog.shapes.insert(id.to_string(), shape);
        }
        for (name, raw) in fingers {
            let id = ChordId::parse(name)?;
            let key = id.to_string();
            if !catalog.shapes.contains_key(&key) {
                return Err(DomainError::validation(format!(
                    "fingering given for {name} which has no shape"
                )));
            }
            catalog.fingers.insert(key, FingerAssignment::new(raw)?);
        }
        debug!(
            shapes = catalog.shapes.len(),
            fingers = catalog.fingers.len(),
            "chord catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_table(table: &RawChordTable) -> Result<Self, DomainError> {
        Self::from_raw(
            table.shapes.iter().map(|(name, raw)| (name.as_str(), *raw)),
            table.fingers.iter().map(|(name, raw)| (name.as_str(), *raw)),
        )
    }

    /// The chord table shipped with the device firmware.
    pub fn builtin() -> &'static ChordCatalog {
        static BUILTIN: OnceLock<ChordCatalog> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            Self::from_raw(BUILTIN_SHAPES.iter().copied(), BUILTIN_FINGERS.iter().copied())
                .expect("built-in chord table is valid")
        })
    }

    /// The built-in table behind an `Arc`, for sessions that hold a catalog.
    pub fn shared() -> Arc<ChordCatalog> {
        static SHARED: OnceLock<Arc<ChordCatalog>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::builtin().clone())))
    }

    /// Resolves an identifier to the key it is stored under, trying the
    /// compacted quality and the combined sharp/flat root spellings.
    pub fn canonical_key(&self, id: &ChordId) -> Option<&str> {
        let compact = id.compact_quality();
        let mut roots = vec![id.root()];
        if let Some((_, _, combined)) = ENHARMONIC_ROOTS
            .iter()
            .find(|(flat, sharp, _)| *flat == id.root() || *sharp == id.root())
        {
            roots.push(*combined);
        }
        for root in roots {
            for quality in [id.quality(), compact.as_str()] {
                let key = format!("{root} {quality}");
                if let Some((stored, _)) = self.shapes.get_key_value(&key) {
                    return Some(stored.as_str());
                }
            }
        }
        None
    }

    pub fn lookup(&self, id: &ChordId) -> Result<&ChordShape, DomainError> {
        self.canonical_key(id)
            .and_then(|key| self.shapes.get(key))
            .ok_or_else(|| DomainError::unknown_chord(id.to_string()))
    }

    pub fn lookup_str(&self, name: &str) -> Result<&ChordShape, DomainError> {
        let id = ChordId::parse(name).map_err(|_| DomainError::unknown_chord(name))?;
        self.lookup(&id)
    }

    pub fn fingers(&self, id: &ChordId) -> Option<&FingerAssignment> {
        self.canonical_key(id).and_then(|key| self.fingers.get(key))
    }

    pub fn contains(&self, id: &ChordId) -> bool {
        self.canonical_key(id).is_some()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.shapes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[rustfmt::skip]
const BUILTIN_SHAPES: &[(&str, [i8; STRING_COUNT])] = &[
    ("A Major", [-1, 10, 8, 8, 8, 10]),
    ("A Minor", [-1, 10, 8, 8, 7, 10]),
    ("A 7", [-1, 10, 8, 10, 8, 10]),
    ("A Dim", [-1, 10, 9, 8, 9, 10]),
    ("A Dim7", [8, -1, 9, 8, 9, -1]),
    ("A Aug", [-1, 10, 7, 8, 8, 9]),
    ("A Sus2", [-1, 10, 8, 8, 10, 10]),
    ("A Sus4", [-1, 10, 8, 8, 7, 10]),
    ("A maj7", [-1, 10, 8, 9, 8, 10]),
    ("A m7", [-1, 10, 8, 10, 9, 10]),
    ("A 7sus4", [-1, 10, 8, 10, 7, 10]),
    ("B Major", [-1, 8, 6, 6, 6, 8]),
    ("B Minor", [-1, 8, 6, 6, 7, 8]),
    ("B 7", [-1, 8, 6, 8, 10, 8]),
    ("B Dim", [-1, 8, 7, 6, 7, -1]),
    ("B Dim7", [9, 0, 10, 9, 10, 0]),
    ("B Aug", [3, 4, 5, 10, 10, -1]),
    ("B Sus2", [-1, 8, 6, 6, 8, 8]),
    ("B Sus4", [-1, 8, 6, 6, 5, 8]),
    ("B maj7", [-1, -1, 9, 7, 10, 8]),
    ("B m7", [-1, 10, 10, 8, 10, 8]),
    ("B 7sus4", [-1, 8, 6, 8, 5, 8]),
    ("C Major", [-1, 7, 8, 10, 9, 10]),
    ("C Minor", [-1, 7, 9, 10, 9, 7]),
    ("C 7", [-1, 7, 8, 7, 9, 10]),
    ("C Dim", [-1, 7, 6, 5, 6, -1]),
    ("C Dim7", [8, -1, 9, 8, 9, -1]),
    ("C Aug", [-1, 7, 8, 9, 9, 10]),
    ("C Sus2", [-1, 7, 5, 5, 7, 7]),
    ("C Sus4", [-1, 7, 7, 10, 9, -1]),
    ("C maj7", [-1, -1, 8, 6, 9, 7]),
    ("C m7", [-1, 7, 9, 7, 9, -1]),
    ("C 7sus4", [-1, 7, 5, 7, 4, 7]),
    ("D Major", [-1, -1, 10, 8, 7, 8]),
    ("D Minor", [-1, -1, 10, 8, 7, 9]),
    ("D 7", [-1, -1, 10, 8, 9, 8]),
    ("D Dim", [-1, 5, 4, 3, 4, -1]),
    ("D Dim7", [-1, -1, 10, 9, 10, 9]),
    ("D Aug", [-1, -1, 10, 7, 7, 8]),
    ("D Sus2", [-1, -1, 10, 8, 7, 10]),
    ("D Sus4", [-1, -1, 10, 8, 7, 7]),
    ("D maj7", [-1, -1, 10, 8, 8, 8]),
    ("D m7", [-1, -1, 10, 8, 9, 9]),
    ("D 7sus4", [-1, -1, 10, 8, 9, 7]),
    ("E Major", [10, 8, 8, 9, 10, 10]),
    ("E Minor", [10, 8, 8, 10, 10, 10]),
    ("E 7", [10, 8, 10, 9, 10, 8]),
    ("E Dim", [10, 9, 8, 10, -1, -1]),
    ("E Dim7", [-1, 9, 8, 10, 8, -1]),
    ("E Aug", [10, 7, 8, 9, 9, 10]),
    ("E Sus2", [10, 8, 8, 7, 6, 10]),
    ("E Sus4", [10, 8, 8, 7, 10, 10]),
    ("E maj7", [10, 8, 10, 9, 10, 10]),
    ("E m7", [10, 8, 10, 10, 10, 10]),
    ("E 7sus4", [10, 8, 10, 8, 10, 10]),
    ("F Major", [9, 7, 7, 8, 9, 9]),
    ("F Minor", [9, 7, 7, 9, 9, 9]),
    ("F 7", [9, 7, 9, 8, 9, 9]),
    ("F Dim", [9, 8, 7, 9, -1, -1]),
    ("F Dim7", [-1, 8, 7, 9, 8, -1]),
    ("F Aug", [-1, -1, 7, 8, 8, 9]),
    ("F Sus2", [-1, -1, 7, 5, 4, 7]),
    ("F Sus4", [9, 7, 7, 7, 9, 9]),
    ("F maj7", [-1, -1, 7, 8, 9, 10]),
    ("F m7", [9, 7, 9, 9, 9, 9]),
    ("F 7sus4", [9, 7, 9, 7, 9, 9]),
    ("G Major", [7, 8, 10, 10, 10, 7]),
    ("G Minor", [7, 5, 5, 7, 7, 7]),
    ("G 7", [7, 8, 10, 10, 10, 9]),
    ("G Dim", [7, 6, 5, 7, -1, -1]),
    ("G Dim7", [-1, 9, 8, 10, 8, -1]),
    ("G Aug", [7, 8, 9, 10, 10, 7]),
    ("G Sus2", [-1, -1, 5, 3, 2, 5]),
    ("G Sus4", [7, 5, 5, 5, 7, 7]),
    ("G maj7", [-1, 8, 10, 10, 10, 8]),
    ("G m7", [7, 5, 7, 7, 7, 7]),
    ("G 7sus4", [7, 5, 7, 5, 7, 7]),
    ("Ab/G# Major", [-1, -1, 9, 9, 9, 6]),
    ("Ab/G# Minor", [6, 4, 4, 6, 6, 6]),
    ("Ab/G# 7", [-1, -1, 9, 9, 9, 8]),
    ("Ab/G# Dim", [6, 5, 4, 6, -1, -1]),
    ("Ab/G# Dim7", [-1, 8, 7, 9, 8, -1]),
    ("Ab/G# Aug", [-1, -1, 8, 9, 9, 10]),
    ("Ab/G# Sus2", [-1, -1, 4, 2, 1, 4]),
    ("Ab/G# Sus4", [-1, -1, 9, 9, 8, 6]),
    ("Ab/G# maj7", [-1, 7, 9, 9, 9, 7]),
    ("Ab/G# m7", [-1, -1, 9, 9, 10, 8]),
    ("Ab/G# 7sus4", [6, 4, 6, 4, 6, 6]),
    ("Bb/A# Major", [-1, 9, 7, 7, 7, 9]),
    ("Bb/A# Minor", [-1, 9, 7, 7, 8, 9]),
    ("Bb/A# 7", [-1, 9, 7, 9, 7, 9]),
    ("Bb/A# Dim", [-1, 9, 8, 7, 8, -1]),
    ("Bb/A# Dim7", [-1, 9, 8, 10, 8, -1]),
    ("Bb/A# Aug", [-1, -1, 6, 7, 7, 8]),
    ("Bb/A# Sus2", [-1, 9, 7, 7, 9, 9]),
    ("Bb/A# Sus4", [-1, 9, 7, 7, 6, 9]),
    ("Bb/A# maj7", [-1, 9, 7, 8, 7, 9]),
    ("Bb/A# m7", [-1, 9, 7, 9, 8, 9]),
    ("Bb/A# 7sus4", [-1, 9, 7, 9, 6, 9]),
    ("Db/C# Major", [-1, 6, 7, 9, 8, 9]),
    ("Db/C# Minor", [-1, 6, 3, 3, 2, 2]),
    ("Db/C# 7", [-1, 6, 7, 3, 2, -1]),
    ("Db/C# Dim", [-1, 6, 5, 4, 5, -1]),
    ("Db/C# Dim7", [-1, 9, 8, 9, 8, -1]),
    ("Db/C# Aug", [-1, -1, 7, 8, 8, 9]),
    ("Db/C# Sus2", [-1, 6, 4, 4, 6, 6]),
    ("Db/C# Sus4", [-1, 6, 6, 9, 8, -1]),
    ("Db/C# maj7", [9, 6, 7, 9, 9, 9]),
    ("Db/C# m7", [-1, 6, 8, 6, 8, -1]),
    ("Db/C# 7sus4", [-1, 6, 4, 6, 3, 6]),
    ("Eb/D# Major", [-1, -1, 9, 7, 6, 7]),
    ("Eb/D# Minor", [-1, -1, 9, 7, 6, 8]),
    ("Eb/D# 7", [-1, -1, 9, 7, 8, 7]),
    ("Eb/D# Dim", [-1, 4, 3, 2, 3, -1]),
    ("Eb/D# Dim7", [-1, -1, 9, 8, 9, 8]),
    ("Eb/D# Aug", [-1, -1, 5, 6, 6, 7]),
    ("Eb/D# Sus2", [-1, -1, 9, 7, 6, 9]),
    ("Eb/D# Sus4", [-1, -1, 9, 7, 6, 6]),
    ("Eb/D# maj7", [-1, -1, 9, 7, 7, 7]),
    ("Eb/D# m7", [-1, -1, 9, 7, 8, 8]),
    ("Eb/D# 7sus4", [-1, -1, 9, 7, 8, 6]),
    ("Gb/F# Major", [8, 6, 6, 7, 8, 8]),
    ("Gb/F# Minor", [8, 6, 6, 8, 8, 8]),
    ("Gb/F# 7", [8, 6, 8, 7, 8, 8]),
    ("Gb/F# Dim", [8, 7, 6, 8, -1, -1]),
    ("Gb/F# Dim7", [8, -1, 9, 8, 9, -1]),
    ("Gb/F# Aug", [-1, -1, 6, 7, 7, 8]),
    ("Gb/F# Sus2", [-1, -1, 6, 4, 3, 6]),
    ("Gb/F# Sus4", [8, 6, 6, 6, 8, 8]),
    ("Gb/F# maj7", [-1, -1, 6, 7, 8, 9]),
    ("Gb/F# m7", [8, 6, 8, 8, 8, 8]),
    ("Gb/F# 7sus4", [8, 6, 8, 6, 8, 8]),
];

// Fingering is only known for the common open-position chords.
const BUILTIN_FINGERS: &[(&str, [u8; STRING_COUNT])] = &[
    ("A Major", [0, 0, 1, 2, 3, 0]),
    ("A Minor", [0, 0, 2, 3, 1, 0]),
    ("A 7", [0, 0, 1, 0, 2, 0]),
    ("A Dim", [0, 0, 2, 1, 3, 0]),
    ("A Dim7", [1, 0, 3, 2, 4, 0]),
    ("A Aug", [0, 0, 1, 2, 3, 4]),
    ("A Sus2", [0, 0, 1, 2, 4, 0]),
    ("A Sus4", [0, 0, 1, 2, 4, 0]),
    ("A maj7", [0, 0, 1, 3, 2, 0]),
    ("A m7", [0, 0, 1, 3, 2, 0]),
    ("A 7sus4", [0, 0, 1, 3, 4, 0]),
    ("E Major", [0, 2, 3, 1, 0, 0]),
    ("E Minor", [0, 2, 3, 0, 0, 0]),
    ("E 7", [0, 2, 0, 1, 3, 0]),
    ("D Major", [0, 0, 0, 1, 3, 2]),
    ("D Minor", [0, 0, 0, 1, 3, 2]),
    ("D 7", [0, 0, 0, 1, 2, 3]),
    ("G Major", [3, 1, 0, 0, 0, 2]),
    ("G Minor", [3, 1, 0, 0, 0, 2]),
    ("G 7", [3, 1, 0, 0, 0, 2]),
    ("C Major", [0, 3, 2, 0, 1, 0]),
    ("C Minor", [0, 1, 3, 4, 2, 0]),
    ("C 7", [0, 3, 2, 3, 1, 0]),
];
