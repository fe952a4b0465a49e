/// Current on-disk layout version, stored in `PRAGMA user_version`.
/// Bump whenever a collection is added.
pub const SCHEMA_VERSION: i64 = 2;

/// A table the store requires, and the version that introduced it.
#[derive(Debug, Clone, Copy)]
pub struct CollectionDef {
    pub name: &'static str,
    pub introduced_in: i64,
    pub ddl: &'static str,
}

/// Versioned layout: the version number plus every required collection.
#[derive(Debug, Clone, Copy)]
pub struct StoreSchema {
    pub version: i64,
    pub collections: &'static [CollectionDef],
}

impl StoreSchema {
    /// Collections that a database at `from_version` does not have yet.
    pub fn introduced_after(&self, from_version: i64) -> impl Iterator<Item = &CollectionDef> {
        self.collections
            .iter()
            .filter(move |c| c.introduced_in > from_version)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.collections.iter().map(|c| c.name)
    }
}

const WORKFLOW_DDL: &str = r#"
-- Current editing session: one row under a fixed key
CREATE TABLE IF NOT EXISTS workflow (
    key TEXT PRIMARY KEY,
    images TEXT NOT NULL,          -- JSON array of {name, mime_type, data(base64)}
    history_index INTEGER NOT NULL,
    saved_at TEXT NOT NULL         -- RFC 3339 timestamp
);
"#;

const GALLERY_DDL: &str = r#"
-- Past results, capacity-bounded by the gallery manager
CREATE TABLE IF NOT EXISTS gallery (
    id INTEGER PRIMARY KEY AUTOINCREMENT,   -- AUTOINCREMENT: ids are never reused
    name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    blob BLOB NOT NULL,
    thumbnail BLOB NOT NULL,
    created_at INTEGER NOT NULL             -- milliseconds since the Unix epoch
);

CREATE INDEX IF NOT EXISTS idx_gallery_created_at ON gallery(created_at, id);
"#;

pub const COLLECTIONS: &[CollectionDef] = &[
    CollectionDef { name: "workflow", introduced_in: 1, ddl: WORKFLOW_DDL },
    CollectionDef { name: "gallery", introduced_in: 2, ddl: GALLERY_DDL },
];

pub const SCHEMA: StoreSchema = StoreSchema {
    version: SCHEMA_VERSION,
    collections: COLLECTIONS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_introduced_after() {
        let fresh: Vec<_> = SCHEMA.introduced_after(0).map(|c| c.name).collect();
        assert_eq!(fresh, vec!["workflow", "gallery"]);

        let from_v1: Vec<_> = SCHEMA.introduced_after(1).map(|c| c.name).collect();
        assert_eq!(from_v1, vec!["gallery"]);

        assert_eq!(SCHEMA.introduced_after(SCHEMA_VERSION).count(), 0);
    }

    #[test]
    fn test_version_covers_every_collection() {
        assert!(SCHEMA.collections.iter().all(|c| c.introduced_in <= SCHEMA.version));
    }
}
