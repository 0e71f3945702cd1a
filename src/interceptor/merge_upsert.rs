use anyhow::Result;

use crate::document_store::{Collection, Document, DocumentStore, DocumentStoreError};

/// Merges a batch of incoming records into `collection` inside one transaction.
///
/// For each record, the stored record with the same URI (if any) is merged
/// field by field with the incoming one, incoming fields winning; an unseen
/// URI stores the incoming record as is. Either every record of the batch is
/// written or, on any failure, none is.
///
/// Records sharing a URI within one batch are applied in order, so the later
/// one wins on conflicting fields. Returns the number of records written.
pub fn merge_upsert(
    store: &dyn DocumentStore,
    collection: Collection,
    incoming: &[Document],
) -> Result<usize> {
    let mut written = 0;
    store.transaction(&[collection], &mut |tx| {
        written = 0;
        for document in incoming {
            let uri = document.uri().ok_or(DocumentStoreError::MissingUri)?;
            let merged = match tx.get(collection, uri)? {
                Some(existing) => existing.merged_with(document),
                None => document.clone(),
            };
            tx.put(collection, &merged)?;
            written += 1;
        }
        Ok(())
    })?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::SqliteDocumentStore;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        Document::try_from(value).unwrap()
    }

    fn stored(store: &SqliteDocumentStore, uri: &str) -> Value {
        Value::from(store.get(Collection::Albums, uri).unwrap().unwrap())
    }

    #[test]
    fn test_unseen_uri_is_stored_unchanged() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let album = json!({"uri": "x", "name": "Foo", "images": [{"url": "a.jpg"}]});

        let written = merge_upsert(&store, Collection::Albums, &[doc(album.clone())]).unwrap();
        assert_eq!(written, 1);
        assert_eq!(stored(&store, "x"), album);
    }

    #[test]
    fn test_same_uri_is_merged_not_replaced() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        merge_upsert(
            &store,
            Collection::Albums,
            &[doc(json!({"uri": "x", "name": "Foo"}))],
        )
        .unwrap();
        merge_upsert(
            &store,
            Collection::Albums,
            &[doc(json!({"uri": "x", "images": ["a.jpg"]}))],
        )
        .unwrap();

        assert_eq!(
            stored(&store, "x"),
            json!({"uri": "x", "name": "Foo", "images": ["a.jpg"]})
        );
        assert_eq!(store.count(Collection::Albums).unwrap(), 1);
    }

    #[test]
    fn test_incoming_fields_win() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        merge_upsert(
            &store,
            Collection::Albums,
            &[doc(json!({"uri": "x", "name": "Old", "source": "local"}))],
        )
        .unwrap();
        merge_upsert(
            &store,
            Collection::Albums,
            &[doc(json!({"uri": "x", "name": "New"}))],
        )
        .unwrap();

        assert_eq!(
            stored(&store, "x"),
            json!({"uri": "x", "name": "New", "source": "local"})
        );
    }

    #[test]
    fn test_duplicates_within_batch_merge_in_order() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        merge_upsert(
            &store,
            Collection::Albums,
            &[
                doc(json!({"uri": "x", "name": "First", "year": 1999})),
                doc(json!({"uri": "x", "name": "Second"})),
            ],
        )
        .unwrap();

        assert_eq!(
            stored(&store, "x"),
            json!({"uri": "x", "name": "Second", "year": 1999})
        );
    }

    #[test]
    fn test_failed_record_aborts_whole_batch() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        merge_upsert(
            &store,
            Collection::Albums,
            &[doc(json!({"uri": "x", "name": "Kept"}))],
        )
        .unwrap();

        let result = merge_upsert(
            &store,
            Collection::Albums,
            &[
                doc(json!({"uri": "x", "name": "Changed"})),
                doc(json!({"uri": "y", "name": "New"})),
                doc(json!({"name": "No uri"})),
            ],
        );

        assert!(result.is_err());
        assert_eq!(stored(&store, "x"), json!({"uri": "x", "name": "Kept"}));
        assert!(store.get(Collection::Albums, "y").unwrap().is_none());
        assert_eq!(store.count(Collection::Albums).unwrap(), 1);
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        assert_eq!(merge_upsert(&store, Collection::Albums, &[]).unwrap(), 0);
        assert_eq!(store.count(Collection::Albums).unwrap(), 0);
    }

    #[test]
    fn test_other_collections_use_the_same_merge() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        merge_upsert(
            &store,
            Collection::Artists,
            &[doc(json!({"uri": "a", "name": "Artist"}))],
        )
        .unwrap();
        merge_upsert(
            &store,
            Collection::Artists,
            &[doc(json!({"uri": "a", "followers": 10}))],
        )
        .unwrap();

        let artist = store.get(Collection::Artists, "a").unwrap().unwrap();
        assert_eq!(
            Value::from(artist),
            json!({"uri": "a", "name": "Artist", "followers": 10})
        );
    }
}
