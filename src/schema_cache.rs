use std::collections::HashMap;

use crate::ColumnMetadata;

/// Per-connection table name → column metadata map.
///
/// Entries are filled lazily and changed only after the engine confirmed the
/// statement that made them stale.
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: HashMap<String, Vec<ColumnMetadata>>,
}

impl SchemaCache {
    pub fn get(&self, table: &str) -> Option<&[ColumnMetadata]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<ColumnMetadata>) {
        self.tables.insert(table.into(), columns);
    }

    pub fn invalidate(&mut self, table: &str) -> bool {
        let removed = self.tables.remove(table).is_some();

        #[cfg(feature = "tracing")]
        if removed {
            tracing::debug!(table, "invalidated cached columns");
        }

        removed
    }

    /// Moves the entry for `current` to `new`. A stale entry under `new` is
    /// dropped either way.
    pub fn rename(&mut self, current: &str, new: &str) {
        self.tables.remove(new);
        if let Some(columns) = self.tables.remove(current) {
            self.tables.insert(new.to_owned(), columns);
        }
    }

    /// The column whose value is synthesized on insert.
    pub fn identity_column(&self, table: &str) -> Option<&ColumnMetadata> {
        self.get(table)?.iter().find(|column| column.is_identity())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::SchemaCache;
    use crate::{ColumnMetadata, ColumnType};

    fn columns() -> Vec<ColumnMetadata> {
        let mut id = ColumnMetadata::inferred("ID", ColumnType::Integer);
        id.primary = true;
        id.autoincrement = true;
        vec![id, ColumnMetadata::inferred("NAME", ColumnType::String)]
    }

    #[test]
    fn rename_moves_entry() {
        let mut cache = SchemaCache::default();
        cache.insert("old", columns());
        cache.rename("old", "new");
        assert!(!cache.contains("old"));
        assert_eq!(cache.get("new").map(<[_]>::len), Some(2));
    }

    #[test]
    fn rename_drops_stale_target() {
        let mut cache = SchemaCache::default();
        cache.insert("new", columns());
        cache.rename("missing", "new");
        assert!(cache.is_empty());
    }

    #[test]
    fn identity_requires_primary_and_autoincrement() {
        let mut cache = SchemaCache::default();
        cache.insert("t", columns());
        assert_eq!(cache.identity_column("t").map(|c| c.name.as_str()), Some("ID"));

        cache.insert("plain", vec![ColumnMetadata::inferred("ID", ColumnType::Integer)]);
        assert!(cache.identity_column("plain").is_none());
        assert!(cache.invalidate("plain"));
        assert!(!cache.invalidate("plain"));
    }
}
