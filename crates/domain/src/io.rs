use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::song::Song;
use crate::timeline::Timeline;
use crate::DomainError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(DocumentFormat::Json),
            Some("yaml") | Some("yml") => Ok(DocumentFormat::Yaml),
            other => Err(DomainError::validation(format!(
                "unsupported document extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

pub fn parse_document<T: DeserializeOwned>(
    text: &str,
    format: DocumentFormat,
) -> Result<T, DomainError> {
    match format {
        DocumentFormat::Json => {
            serde_json::from_str(text).map_err(|err| DomainError::Serialization(err.to_string()))
        }
        DocumentFormat::Yaml => {
            serde_yaml::from_str(text).map_err(|err| DomainError::Serialization(err.to_string()))
        }
    }
}

pub fn write_document<T: Serialize>(
    value: &T,
    format: DocumentFormat,
) -> Result<Vec<u8>, DomainError> {
    match format {
        DocumentFormat::Json => serde_json::to_vec_pretty(value)
            .map_err(|err| DomainError::Serialization(err.to_string())),
        DocumentFormat::Yaml => serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|err| DomainError::Serialization(err.to_string())),
    }
}

/// Reads a JSON or YAML document, picking the parser from the extension.
pub fn read_document<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, DomainError> {
    let path = path.as_ref();
    let format = DocumentFormat::from_path(path)?;
    let text = fs::read_to_string(path)
        .map_err(|err| DomainError::Serialization(format!("read {}: {err}", path.display())))?;
    parse_document(&text, format)
}

/// A practice timeline file holds either a full song or a bare event list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TimelineDocument {
    Song(Song),
    Events(Timeline),
}

impl TimelineDocument {
    pub fn title(&self) -> Option<&str> {
        match self {
            TimelineDocument::Song(song) => Some(&song.title),
            TimelineDocument::Events(_) => None,
        }
    }

    pub fn into_timeline(self) -> Timeline {
        match self {
            TimelineDocument::Song(song) => song.timeline,
            TimelineDocument::Events(timeline) => timeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ChordCatalog, RawChordTable};
    use crate::song::find_builtin;

    #[test]
    fn exports_song_as_json() {
        let song = find_builtin("wagon-wheel").unwrap();
        let bytes = write_document(&song, DocumentFormat::Json).unwrap();
        let output = String::from_utf8(bytes).unwrap();
        assert!(output.contains("\"title\": \"Wagon Wheel\""));
        assert!(output.contains("\"chord\": \"G Major\""));
    }

    #[test]
    fn yaml_event_list_parses_as_timeline() {
        let yaml = "- chord: G_Major\n  start_ms: 0\n  duration_ms: 4000\n- chord: D_Major\n  start_ms: 4000\n  duration_ms: 4000\n";
        let document: TimelineDocument = parse_document(yaml, DocumentFormat::Yaml).unwrap();
        assert!(document.title().is_none());
        assert_eq!(document.into_timeline().len(), 2);
    }

    #[test]
    fn song_document_keeps_title() {
        let song = find_builtin("smoke-on-the-water").unwrap();
        let bytes = write_document(&song, DocumentFormat::Yaml).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let document: TimelineDocument = parse_document(&text, DocumentFormat::Yaml).unwrap();
        assert_eq!(document.title(), Some("Smoke on the Water"));
    }

    #[test]
    fn chord_table_parses_from_json() {
        let json = r#"{"shapes":{"C Major":[-1,7,8,10,9,10]},"fingers":{"C Major":[0,3,2,0,1,0]}}"#;
        let table: RawChordTable = parse_document(json, DocumentFormat::Json).unwrap();
        let catalog = ChordCatalog::from_table(&table).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(DocumentFormat::from_path(Path::new("song.txt")).is_err());
        assert_eq!(
            DocumentFormat::from_path(Path::new("song.yml")).unwrap(),
            DocumentFormat::Yaml
        );
    }
}
