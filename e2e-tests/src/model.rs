use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The empty parent id, meaning "at the root of the tree".
pub const ROOT_PARENT: &str = "";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DocKind {
    /// Leaf entry carrying a binary payload.
    #[serde(rename = "DocumentType")]
    Document,
    /// Container entry, no payload.
    #[serde(rename = "CollectionType")]
    Collection,
}

impl DocKind {
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Document => "DocumentType",
            Self::Collection => "CollectionType",
        }
    }
}

/// The harness's mirror of one document the service is expected to hold.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub kind: DocKind,
    /// Last uploaded payload. `Some` only for [`DocKind::Document`].
    pub data: Option<Vec<u8>>,
    pub current_page: i64,
    pub bookmarked: bool,
    pub parent: String,
    pub modified_at: DateTime<Utc>,
    pub version: i64,
}

impl Document {
    /// Register a mutation: bump the version exactly once and refresh the
    /// modification timestamp. Must be called before the corresponding wire
    /// request is constructed so model and service never diverge.
    pub fn touch(&mut self) {
        self.version += 1;
        self.modified_at = Utc::now();
    }
}

/// In-memory mirror of every document the harness believes exists.
///
/// Backed by a vec so the mutation planner can pick entries uniformly by
/// index. Only the mutation engine writes to it; the verifier drains it.
#[derive(Debug, Default)]
pub struct DocumentModel {
    docs: Vec<Document>,
}

impl DocumentModel {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, index: usize) -> &Document {
        &self.docs[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Document {
        &mut self.docs[index]
    }

    pub fn insert(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn remove(&mut self, index: usize) -> Document {
        self.docs.remove(index)
    }

    pub fn find(&self, id: &str) -> Option<&Document> {
        self.docs.iter().find(|doc| doc.id == id)
    }

    /// Remove and return the document with the given id, if the model holds
    /// one. Used by the verifier to drain matched entries.
    pub fn take_by_id(&mut self, id: &str) -> Option<Document> {
        let index = self.docs.iter().position(|doc| doc.id == id)?;

        Some(self.docs.remove(index))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.iter().map(|doc| doc.id.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    Added,
    Deleted,
}

impl EventKind {
    /// Every non-delete mutation is reported by the service as `DocAdded`.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Added => "DocAdded",
            Self::Deleted => "DocDeleted",
        }
    }
}

/// One entry of the notification oracle: the event the service is expected
/// to push for a mutation, with the full field snapshot taken at mutation
/// time.
#[derive(Clone, Debug)]
pub struct ExpectedEvent {
    pub kind: EventKind,
    pub snapshot: Document,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_owned(),
            name: "a-document".to_owned(),
            kind: DocKind::Collection,
            data: None,
            current_page: 0,
            bookmarked: false,
            parent: ROOT_PARENT.to_owned(),
            modified_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn touch_bumps_version_once_and_refreshes_timestamp() {
        let mut d = doc("d1");
        let before = d.modified_at;

        d.touch();

        assert_eq!(d.version, 2);
        assert!(d.modified_at >= before);
    }

    #[test]
    fn take_by_id_drains_matching_entries() {
        let mut model = DocumentModel::default();
        model.insert(doc("d1"));
        model.insert(doc("d2"));

        let taken = model.take_by_id("d1").expect("d1 should be present");

        assert_eq!(taken.id, "d1");
        assert_eq!(model.len(), 1);
        assert!(model.take_by_id("d1").is_none());
    }

    #[test]
    fn kind_wire_names_round_trip_through_serde() {
        let json = serde_json::to_string(&DocKind::Document).expect("serialize");

        assert_eq!(json, "\"DocumentType\"");
        assert_eq!(DocKind::Document.wire_name(), "DocumentType");
        assert_eq!(DocKind::Collection.wire_name(), "CollectionType");
    }
}
