//! Track sources: turn a `TrackRef` into encoded audio bytes

use crate::error::{Error, Result};
use async_trait::async_trait;
use segue_common::TrackRef;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Yields raw encoded audio bytes for a track
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn fetch(&self, track: &TrackRef) -> Result<Vec<u8>>;
}

/// Reads tracks from the local file system.
///
/// Relative references resolve against `root` when one is configured.
#[derive(Debug, Clone, Default)]
pub struct FileTrackSource {
    root: Option<PathBuf>,
}

impl FileTrackSource {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// File path a track reference resolves to
    pub fn resolve(&self, track: &TrackRef) -> PathBuf {
        let path = Path::new(track.as_str());
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl TrackSource for FileTrackSource {
    async fn fetch(&self, track: &TrackRef) -> Result<Vec<u8>> {
        let path = self.resolve(track);
        debug!("Reading {}", path.display());
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::TrackNotFound(track.clone())
            } else {
                Error::Fetch {
                    track: track.clone(),
                    source: e,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), [1u8, 2, 3]).unwrap();

        let source = FileTrackSource::new(Some(dir.path().to_path_buf()));
        let bytes = source.fetch(&TrackRef::new("a.bin")).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_file_is_track_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileTrackSource::new(Some(dir.path().to_path_buf()));

        let err = source.fetch(&TrackRef::new("missing.flac")).await.unwrap_err();
        assert!(matches!(err, Error::TrackNotFound(_)));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_absolute_paths_ignore_root() {
        let source = FileTrackSource::new(Some(PathBuf::from("/music")));
        let absolute = if cfg!(windows) { "C:\\x.mp3" } else { "/tmp/x.mp3" };
        assert_eq!(source.resolve(&TrackRef::new(absolute)), PathBuf::from(absolute));
        assert_eq!(source.resolve(&TrackRef::new("x.mp3")), PathBuf::from("/music/x.mp3"));
    }
}
