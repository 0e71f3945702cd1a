//! The action vocabulary seen by the persistence interceptor.
//!
//! Actions are serialized with an internal `type` tag carrying the wire name
//! (`{"type": "PUSHER_CONNECTED", "connection_id": "..."}`). Kinds this crate
//! does not know about deserialize to [`Action::Unrecognized`]; a known kind
//! whose payload does not fit becomes [`Action::Malformed`] when read through
//! [`Action::from_json_lenient`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::document_store::Document;

/// Kinds excluded from action logging because they fire constantly.
pub const UNLOGGED_KINDS: &[&str] = &["START_LOADING", "STOP_LOADING"];

/// Wire names of every kind with a dedicated variant.
pub const KNOWN_KINDS: &[&str] = &[
    "PUSHER_CONNECTED",
    "PUSHER_SET_PORT",
    "PUSHER_USERNAME_CHANGED",
    "MOPIDY_URISCHEMES_FILTERED",
    "SPOTIFY_IMPORT_AUTHORIZATION",
    "SPOTIFY_AUTHORIZATION_GRANTED",
    "SPOTIFY_AUTHORIZATION_REVOKED",
    "SPOTIFY_TOKEN_REFRESHED",
    "SPOTIFY_ME_LOADED",
    "CORE_SET",
    "UI_SET",
    "MOPIDY_SET",
    "SPOTIFY_SET",
    "SUPPRESS_BROADCAST",
    "LASTFM_AUTHORIZATION_GRANTED",
    "LASTFM_AUTHORIZATION_REVOKED",
    "DB_UPDATE_ALBUMS",
    "START_LOADING",
    "STOP_LOADING",
    "HANDLE_EXCEPTION",
];

/// Payload of `SPOTIFY_TOKEN_REFRESHED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshedToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<Value>,
}

/// Payload of `LASTFM_AUTHORIZATION_GRANTED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastfmAuthorization {
    #[serde(default)]
    pub session: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    // Transport
    #[serde(rename = "PUSHER_CONNECTED")]
    PusherConnected { connection_id: Value },

    #[serde(rename = "PUSHER_SET_PORT")]
    PusherSetPort { port: Value },

    #[serde(rename = "PUSHER_USERNAME_CHANGED")]
    PusherUsernameChanged { username: Value },

    // Backend
    #[serde(rename = "MOPIDY_URISCHEMES_FILTERED")]
    MopidyUriSchemesFiltered { data: Value },

    // Streaming provider. Authorization objects come either under
    // `authorization` or under `data`, depending on where they originate.
    #[serde(rename = "SPOTIFY_IMPORT_AUTHORIZATION")]
    SpotifyImportAuthorization {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        authorization: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    #[serde(rename = "SPOTIFY_AUTHORIZATION_GRANTED")]
    SpotifyAuthorizationGranted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        authorization: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    #[serde(rename = "SPOTIFY_AUTHORIZATION_REVOKED")]
    SpotifyAuthorizationRevoked,

    #[serde(rename = "SPOTIFY_TOKEN_REFRESHED")]
    SpotifyTokenRefreshed {
        #[serde(default)]
        data: RefreshedToken,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },

    #[serde(rename = "SPOTIFY_ME_LOADED")]
    SpotifyMeLoaded { data: Value },

    // Bulk state
    #[serde(rename = "CORE_SET")]
    CoreSet { data: Map<String, Value> },

    #[serde(rename = "UI_SET")]
    UiSet { data: Map<String, Value> },

    #[serde(rename = "MOPIDY_SET")]
    MopidySet { data: Map<String, Value> },

    #[serde(rename = "SPOTIFY_SET")]
    SpotifySet { data: Map<String, Value> },

    #[serde(rename = "SUPPRESS_BROADCAST")]
    SuppressBroadcast { key: String },

    // Scrobbling provider
    #[serde(rename = "LASTFM_AUTHORIZATION_GRANTED")]
    LastfmAuthorizationGranted { data: LastfmAuthorization },

    #[serde(rename = "LASTFM_AUTHORIZATION_REVOKED")]
    LastfmAuthorizationRevoked,

    // Document store
    #[serde(rename = "DB_UPDATE_ALBUMS")]
    DbUpdateAlbums { albums: Vec<Document> },

    // Known, never persisted
    #[serde(rename = "START_LOADING")]
    StartLoading {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },

    #[serde(rename = "STOP_LOADING")]
    StopLoading {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },

    /// Describes a failure, including persistence failures reported by the interceptor.
    #[serde(rename = "HANDLE_EXCEPTION")]
    HandleException { message: String, description: String },

    /// A known kind whose payload could not be read. Carries the original
    /// kind and the raw action so later stages still see what was sent.
    #[serde(rename = "MALFORMED")]
    Malformed {
        kind: String,
        raw: Value,
        error: String,
    },

    #[serde(other)]
    Unrecognized,
}

impl Action {
    /// The wire name of this action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::PusherConnected { .. } => "PUSHER_CONNECTED",
            Action::PusherSetPort { .. } => "PUSHER_SET_PORT",
            Action::PusherUsernameChanged { .. } => "PUSHER_USERNAME_CHANGED",
            Action::MopidyUriSchemesFiltered { .. } => "MOPIDY_URISCHEMES_FILTERED",
            Action::SpotifyImportAuthorization { .. } => "SPOTIFY_IMPORT_AUTHORIZATION",
            Action::SpotifyAuthorizationGranted { .. } => "SPOTIFY_AUTHORIZATION_GRANTED",
            Action::SpotifyAuthorizationRevoked => "SPOTIFY_AUTHORIZATION_REVOKED",
            Action::SpotifyTokenRefreshed { .. } => "SPOTIFY_TOKEN_REFRESHED",
            Action::SpotifyMeLoaded { .. } => "SPOTIFY_ME_LOADED",
            Action::CoreSet { .. } => "CORE_SET",
            Action::UiSet { .. } => "UI_SET",
            Action::MopidySet { .. } => "MOPIDY_SET",
            Action::SpotifySet { .. } => "SPOTIFY_SET",
            Action::SuppressBroadcast { .. } => "SUPPRESS_BROADCAST",
            Action::LastfmAuthorizationGranted { .. } => "LASTFM_AUTHORIZATION_GRANTED",
            Action::LastfmAuthorizationRevoked => "LASTFM_AUTHORIZATION_REVOKED",
            Action::DbUpdateAlbums { .. } => "DB_UPDATE_ALBUMS",
            Action::StartLoading { .. } => "START_LOADING",
            Action::StopLoading { .. } => "STOP_LOADING",
            Action::HandleException { .. } => "HANDLE_EXCEPTION",
            Action::Malformed { .. } => "MALFORMED",
            Action::Unrecognized => "UNRECOGNIZED",
        }
    }

    /// Builds the action that reports a failure back into the pipeline.
    pub fn exception(message: impl Into<String>, error: &anyhow::Error) -> Self {
        Action::HandleException {
            message: message.into(),
            description: format!("{:#}", error),
        }
    }

    /// Parses one serialized action.
    ///
    /// Never fails. Input that is not a JSON object with a string `type` is
    /// logged and read as [`Action::Unrecognized`]. A known kind whose payload
    /// does not match its variant is kept as [`Action::Malformed`], with the
    /// original kind and raw value.
    pub fn from_json_lenient(raw: &str) -> Action {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("Treating unparsable action as unrecognized: {}", err);
                return Action::Unrecognized;
            }
        };
        Self::from_value_lenient(value)
    }

    /// Same as [`Action::from_json_lenient`], for an already parsed value.
    pub fn from_value_lenient(value: Value) -> Action {
        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                warn!("Treating action without a type as unrecognized");
                return Action::Unrecognized;
            }
        };

        match serde_json::from_value::<Action>(value.clone()) {
            Ok(action) => action,
            Err(err) if KNOWN_KINDS.contains(&kind.as_str()) => {
                warn!("Malformed {} payload: {}", kind, err);
                Action::Malformed {
                    kind,
                    raw: value,
                    error: err.to_string(),
                }
            }
            Err(err) => {
                warn!("Treating malformed {} action as unrecognized: {}", kind, err);
                Action::Unrecognized
            }
        }
    }
}
