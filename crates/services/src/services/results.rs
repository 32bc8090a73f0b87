use serde::{Serialize, Serializer, ser::SerializeMap};

/// One page of a filtered list, with the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub results: Vec<T>,
}

/// Serializes as `{"deleted": true, "<kind>_id": <id>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteConfirmation {
    pub kind: &'static str,
    pub id: i64,
}

impl DeleteConfirmation {
    pub fn new(kind: &'static str, id: i64) -> Self {
        Self { kind, id }
    }
}

impl Serialize for DeleteConfirmation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("deleted", &true)?;
        map.serialize_entry(&format!("{}_id", self.kind), &self.id)?;
        map.end()
    }
}
