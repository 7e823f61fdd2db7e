//! Track references
//!
//! A `TrackRef` is the opaque identifier the presentation layer hands to the
//! player. The player never interprets it beyond passing it to a track source.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, immutable identifier of a playable track (path or URI)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef(String);

impl TrackRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TrackRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_ref_serializes_as_plain_string() {
        let track = TrackRef::new("music/a.flac");
        let json = serde_json::to_string(&track).unwrap();
        assert_eq!(json, "\"music/a.flac\"");

        let back: TrackRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, track);
    }

    #[test]
    fn test_track_ref_display() {
        assert_eq!(TrackRef::from("b.mp3").to_string(), "b.mp3");
    }
}
