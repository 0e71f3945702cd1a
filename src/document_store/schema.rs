//! SQLite schema definitions for the document database.
//!
//! Every collection gets the same layout: the record URI as primary key, the
//! record name pulled out for indexing, and the full record as JSON text.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

macro_rules! document_table {
    ($table:expr, $indices:expr) => {
        Table {
            name: $table,
            columns: &[
                sqlite_column!("uri", &SqlType::Text, is_primary_key = true),
                sqlite_column!("name", &SqlType::Text),
                sqlite_column!("data", &SqlType::Text, non_null = true),
                sqlite_column!(
                    "updated_at",
                    &SqlType::Text,
                    non_null = true,
                    default_value = Some(DEFAULT_TIMESTAMP)
                ),
            ],
            indices: $indices,
        }
    };
}

// =============================================================================
// Version 1 - Albums, artists, playlists, tracks, users
// =============================================================================

const ALBUMS_TABLE_V1: Table = document_table!("albums", &[("idx_albums_name", "name")]);
const ARTISTS_TABLE_V1: Table = document_table!("artists", &[("idx_artists_name", "name")]);
const PLAYLISTS_TABLE_V1: Table =
    document_table!("playlists", &[("idx_playlists_name", "name")]);
const TRACKS_TABLE_V1: Table = document_table!("tracks", &[("idx_tracks_name", "name")]);
const USERS_TABLE_V1: Table = document_table!("users", &[]);

pub const DOCUMENT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        ALBUMS_TABLE_V1,
        ARTISTS_TABLE_V1,
        PLAYLISTS_TABLE_V1,
        TRACKS_TABLE_V1,
        USERS_TABLE_V1,
    ],
    migration: None,
}];
