use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Collections of the document database, each keyed by record URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Albums,
    Artists,
    Playlists,
    Tracks,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Albums,
        Collection::Artists,
        Collection::Playlists,
        Collection::Tracks,
        Collection::Users,
    ];

    /// Also the name of the backing table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Albums => "albums",
            Collection::Artists => "artists",
            Collection::Playlists => "playlists",
            Collection::Tracks => "tracks",
            Collection::Users => "users",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "albums" => Some(Collection::Albums),
            "artists" => Some(Collection::Artists),
            "playlists" => Some(Collection::Playlists),
            "tracks" => Some(Collection::Tracks),
            "users" => Some(Collection::Users),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schema-light record: any JSON object carrying a string `uri`.
///
/// Fields other than `uri` are open-ended and may arrive over time from
/// different sources, so the record is kept as a plain JSON map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The record identity. `None` when the field is missing, empty or not a string.
    pub fn uri(&self) -> Option<&str> {
        self.0
            .get("uri")
            .and_then(Value::as_str)
            .filter(|uri| !uri.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Field-level merge: starts from `self` and overwrites every field present
    /// in `incoming`. Fields missing from `incoming` are kept.
    pub fn merged_with(mut self, incoming: &Document) -> Document {
        for (field, value) in &incoming.0 {
            self.0.insert(field.clone(), value.clone());
        }
        self
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentStoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Document(fields)),
            _ => Err(DocumentStoreError::NotAnObject),
        }
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        Value::Object(document.0)
    }
}

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("Document has no string `uri` field")]
    MissingUri,

    #[error("Document is not a JSON object")]
    NotAnObject,

    #[error("Collection {0} is not part of this transaction")]
    OutOfScope(Collection),
}
