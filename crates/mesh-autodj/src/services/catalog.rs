use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::read_yaml;
use crate::track::Track;

/// Source of candidate tracks
pub trait TrackCatalog: Send + Sync {
    fn tracks(&self) -> Vec<Track>;

    fn get(&self, id: &str) -> Option<Track> {
        self.tracks().into_iter().find(|track| track.id == id)
    }
}

/// On-disk catalog layout
///
/// ```yaml
/// tracks:
///   - id: t1
///     title: Opener
///     duration: 312.0
///     bpm: 124
///     key: 8A
///     energy: 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// A fixed list of tracks
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tracks: Vec<Track>,
}

impl StaticCatalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let file: CatalogFile = read_yaml(path)?;
        log::info!("StaticCatalog: {} tracks from {:?}", file.tracks.len(), path);
        Ok(Self::new(file.tracks))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl TrackCatalog for StaticCatalog {
    fn tracks(&self) -> Vec<Track> {
        self.tracks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::CamelotKey;

    #[test]
    fn test_catalog_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(
            &path,
            "tracks:\n  - id: t1\n    title: Opener\n    duration: 312.0\n    bpm: 124\n    key: 8A\n    energy: 5\n  - id: t2\n    title: Unknown\n",
        )
        .unwrap();

        let catalog = StaticCatalog::from_yaml_file(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        let opener = catalog.get("t1").unwrap();
        assert_eq!(opener.analysis.bpm, Some(124.0));
        assert_eq!(opener.analysis.key, CamelotKey::parse("8A"));
        assert_eq!(opener.analysis.energy.map(|e| e.level()), Some(5.0));
        assert!(catalog.get("t2").unwrap().analysis.is_empty());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_missing_catalog_file_is_an_error() {
        assert!(StaticCatalog::from_yaml_file(Path::new("/nonexistent/catalog.yaml")).is_err());
    }
}
