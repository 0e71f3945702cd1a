use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The contents of a bucket: a flat JSON object.
pub type BucketContents = Map<String, Value>;

/// Named buckets of persisted application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Core playback and library state.
    Core,
    /// Interface preferences, including suppressed broadcasts.
    Ui,
    /// Transport connection details (connection id, port, username).
    Pusher,
    /// Backend server details.
    Mopidy,
    /// Streaming provider credentials and profile.
    Spotify,
    /// Scrobbling provider session.
    Lastfm,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::Core,
        Bucket::Ui,
        Bucket::Pusher,
        Bucket::Mopidy,
        Bucket::Spotify,
        Bucket::Lastfm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Core => "core",
            Bucket::Ui => "ui",
            Bucket::Pusher => "pusher",
            Bucket::Mopidy => "mopidy",
            Bucket::Spotify => "spotify",
            Bucket::Lastfm => "lastfm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "core" => Some(Bucket::Core),
            "ui" => Some(Bucket::Ui),
            "pusher" => Some(Bucket::Pusher),
            "mopidy" => Some(Bucket::Mopidy),
            "spotify" => Some(Bucket::Spotify),
            "lastfm" => Some(Bucket::Lastfm),
            _ => None,
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BucketStoreError {
    #[error("Bucket {0} does not hold a JSON object")]
    NotAnObject(Bucket),
}

/// Shallow-merges `partial` into `contents`: every key of `partial` overwrites
/// the one in `contents`, every other key is kept.
pub fn shallow_merge(contents: &mut BucketContents, partial: &BucketContents) {
    for (key, value) in partial {
        contents.insert(key.clone(), value.clone());
    }
}
