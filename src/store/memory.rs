use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Document, Store, StoreError};

struct Entry {
    seq: u64,
    doc: Document,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    docs: HashMap<(String, String), Entry>,
    keys: HashMap<(String, String), String>,
}

/// Process-local store used for tests and for running without Postgres.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, mut doc: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let slot = (doc.kind.clone(), doc.id.clone());
        if inner.docs.contains_key(&slot) {
            return Err(StoreError::IdTaken {
                kind: doc.kind,
                id: doc.id,
            });
        }
        if let Some(key) = &doc.lookup_key {
            let key_slot = (doc.kind.clone(), key.clone());
            if inner.keys.contains_key(&key_slot) {
                return Err(StoreError::Duplicate {
                    kind: doc.kind,
                    key: key.clone(),
                });
            }
            inner.keys.insert(key_slot, doc.id.clone());
        }

        doc.version = 1;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.docs.insert(slot, Entry { seq, doc });
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .docs
            .get(&(kind.to_string(), id.to_string()))
            .map(|entry| entry.doc.clone()))
    }

    async fn find_by_key(&self, kind: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.read().await;
        let Some(id) = inner.keys.get(&(kind.to_string(), key.to_string())) else {
            return Ok(None);
        };
        Ok(inner
            .docs
            .get(&(kind.to_string(), id.clone()))
            .map(|entry| entry.doc.clone()))
    }

    async fn update(&self, doc: Document, expected_version: i64) -> Result<i64, StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let slot = (doc.kind.clone(), doc.id.clone());

        let Some(entry) = inner.docs.get_mut(&slot) else {
            return Err(StoreError::Missing {
                kind: doc.kind,
                id: doc.id,
            });
        };
        if entry.doc.version != expected_version {
            return Err(StoreError::Conflict {
                kind: doc.kind,
                id: doc.id,
                expected_version,
            });
        }

        if entry.doc.lookup_key != doc.lookup_key {
            if let Some(key) = &doc.lookup_key {
                let key_slot = (doc.kind.clone(), key.clone());
                if inner.keys.contains_key(&key_slot) {
                    return Err(StoreError::Duplicate {
                        kind: doc.kind,
                        key: key.clone(),
                    });
                }
                inner.keys.insert(key_slot, doc.id.clone());
            }
            if let Some(old) = entry.doc.lookup_key.take() {
                inner.keys.remove(&(doc.kind.clone(), old));
            }
        }

        let version = expected_version + 1;
        entry.doc = Document { version, ..doc };
        Ok(version)
    }

    async fn list(&self, kind: &str) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&Entry> = inner
            .docs
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        Ok(entries.into_iter().map(|entry| entry.doc.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, key: Option<&str>) -> Document {
        Document {
            kind: "thing".into(),
            id: id.into(),
            version: 0,
            lookup_key: key.map(str::to_string),
            body: json!({ "id": id }),
        }
    }

    #[tokio::test]
    async fn update_requires_matching_version() {
        let store = MemoryStore::new();
        store.insert(doc("T-1", None)).await.unwrap();

        assert_eq!(store.update(doc("T-1", None), 1).await.unwrap(), 2);
        let err = store.update(doc("T-1", None), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected_version: 1, .. }));
    }

    #[tokio::test]
    async fn lookup_keys_are_unique_per_kind() {
        let store = MemoryStore::new();
        store.insert(doc("T-1", Some("a@x.io"))).await.unwrap();
        let err = store.insert(doc("T-2", Some("a@x.io"))).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));

        let found = store.find_by_key("thing", "a@x.io").await.unwrap().unwrap();
        assert_eq!(found.id, "T-1");
    }

    #[tokio::test]
    async fn taken_ids_are_reported_separately_from_keys() {
        let store = MemoryStore::new();
        store.insert(doc("T-1", Some("a@x.io"))).await.unwrap();
        let err = store.insert(doc("T-1", Some("b@x.io"))).await.unwrap_err();
        assert!(matches!(err, StoreError::IdTaken { .. }));
        assert!(store.find_by_key("thing", "b@x.io").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let store = MemoryStore::new();
        for id in ["T-3", "T-1", "T-2"] {
            store.insert(doc(id, None)).await.unwrap();
        }
        let ids: Vec<String> = store
            .list("thing")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["T-3", "T-1", "T-2"]);
    }
}
