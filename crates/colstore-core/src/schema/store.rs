//! The schema store: an explicit registry of keyspaces and their tables.
//!
//! Published schemas are `Arc`s. Readers clone the `Arc` and keep a stable
//! view while an `ALTER` swaps in a replacement.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, SchemaError, StorageError};

use super::definition::LogicalTableDefinition;
use super::resolved::ResolvedTableSchema;
use super::{SchemaCompiler, validate_name};

/// A keyspace and the tables it contains. Copy-on-write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceMetadata {
    name: String,
    durable_writes: bool,
    tables: BTreeMap<String, Arc<ResolvedTableSchema>>,
}

impl KeyspaceMetadata {
    pub fn new(name: &str, durable_writes: bool) -> Result<Self, SchemaError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            durable_writes,
            tables: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn durable_writes(&self) -> bool {
        self.durable_writes
    }

    pub fn table(&self, name: &str) -> Option<&Arc<ResolvedTableSchema>> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<ResolvedTableSchema>> {
        self.tables.values()
    }

    /// A copy with `table` added, replacing any table of the same name.
    pub fn with_table_added(&self, table: Arc<ResolvedTableSchema>) -> Self {
        let mut next = self.clone();
        next.tables.insert(table.name().to_string(), table);
        next
    }

    /// A copy without the named table.
    pub fn with_table_removed(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.tables.remove(name);
        next
    }
}

/// Serializable form of a whole store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub keyspaces: Vec<KeyspaceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceSnapshot {
    pub name: String,
    pub durable_writes: bool,
    pub tables: Vec<ResolvedTableSchema>,
}

/// Maps `keyspace.table` to the current resolved schema.
#[derive(Debug, Default)]
pub struct SchemaStore {
    keyspaces: RwLock<BTreeMap<String, Arc<KeyspaceMetadata>>>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_keyspace(&self, name: &str, durable_writes: bool) -> Result<(), SchemaError> {
        let keyspace = KeyspaceMetadata::new(name, durable_writes)?;
        let mut keyspaces = self.keyspaces.write();
        if keyspaces.contains_key(name) {
            return Err(SchemaError::KeyspaceAlreadyExists(name.to_string()));
        }
        keyspaces.insert(name.to_string(), Arc::new(keyspace));
        info!(keyspace = name, "created keyspace");
        Ok(())
    }

    pub fn drop_keyspace(&self, name: &str) -> Result<Arc<KeyspaceMetadata>, SchemaError> {
        let dropped = self
            .keyspaces
            .write()
            .remove(name)
            .ok_or_else(|| SchemaError::KeyspaceNotFound(name.to_string()))?;
        info!(keyspace = name, "dropped keyspace");
        Ok(dropped)
    }

    pub fn keyspace(&self, name: &str) -> Option<Arc<KeyspaceMetadata>> {
        self.keyspaces.read().get(name).cloned()
    }

    pub fn list_keyspaces(&self) -> Vec<String> {
        self.keyspaces.read().keys().cloned().collect()
    }

    /// Compile `def` and publish it.
    ///
    /// With `if_not_exists`, an existing table of the same name is returned
    /// unchanged instead of failing.
    pub fn create_table(
        &self,
        def: &LogicalTableDefinition,
        if_not_exists: bool,
    ) -> Result<Arc<ResolvedTableSchema>, Error> {
        // Compile outside the lock; compilation is pure.
        let schema = Arc::new(SchemaCompiler::compile(def)?);

        let mut keyspaces = self.keyspaces.write();
        let keyspace = keyspaces
            .get_mut(&def.keyspace)
            .ok_or_else(|| SchemaError::KeyspaceNotFound(def.keyspace.clone()))?;
        if let Some(existing) = keyspace.table(&def.name) {
            if if_not_exists {
                return Ok(Arc::clone(existing));
            }
            return Err(SchemaError::TableAlreadyExists(schema.id()).into());
        }
        *keyspace = Arc::new(keyspace.with_table_added(Arc::clone(&schema)));
        info!(table = %schema.id(), "created table");
        Ok(schema)
    }

    /// Replace a table's schema with the result of `alter`.
    ///
    /// The store's write lock is held across `alter`, so concurrent
    /// alterations of the same keyspace apply one after another and readers
    /// never see a half-applied change.
    pub fn alter_table<F>(
        &self,
        keyspace: &str,
        table: &str,
        alter: F,
    ) -> Result<Arc<ResolvedTableSchema>, SchemaError>
    where
        F: FnOnce(&ResolvedTableSchema) -> Result<ResolvedTableSchema, SchemaError>,
    {
        let mut keyspaces = self.keyspaces.write();
        let metadata = keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| SchemaError::KeyspaceNotFound(keyspace.to_string()))?;
        let current = metadata
            .table(table)
            .ok_or_else(|| SchemaError::TableNotFound(format!("{keyspace}.{table}")))?;
        let next = Arc::new(alter(current.as_ref())?);
        if next.name() != table || next.keyspace() != keyspace {
            return Err(SchemaError::InvalidAlteration {
                table: current.id(),
                reason: "table identity cannot change".to_string(),
            });
        }
        *metadata = Arc::new(metadata.with_table_added(Arc::clone(&next)));
        info!(table = %next.id(), version = next.schema_version(), "altered table");
        Ok(next)
    }

    pub fn drop_table(
        &self,
        keyspace: &str,
        table: &str,
    ) -> Result<Arc<ResolvedTableSchema>, SchemaError> {
        let mut keyspaces = self.keyspaces.write();
        let metadata = keyspaces
            .get_mut(keyspace)
            .ok_or_else(|| SchemaError::KeyspaceNotFound(keyspace.to_string()))?;
        let dropped = metadata
            .table(table)
            .cloned()
            .ok_or_else(|| SchemaError::TableNotFound(format!("{keyspace}.{table}")))?;
        *metadata = Arc::new(metadata.with_table_removed(table));
        info!(table = %dropped.id(), "dropped table");
        Ok(dropped)
    }

    pub fn get_table(
        &self,
        keyspace: &str,
        table: &str,
    ) -> Result<Arc<ResolvedTableSchema>, SchemaError> {
        let keyspaces = self.keyspaces.read();
        let metadata = keyspaces
            .get(keyspace)
            .ok_or_else(|| SchemaError::KeyspaceNotFound(keyspace.to_string()))?;
        metadata
            .table(table)
            .cloned()
            .ok_or_else(|| SchemaError::TableNotFound(format!("{keyspace}.{table}")))
    }

    pub fn list_tables(&self, keyspace: &str) -> Result<Vec<String>, SchemaError> {
        let keyspaces = self.keyspaces.read();
        let metadata = keyspaces
            .get(keyspace)
            .ok_or_else(|| SchemaError::KeyspaceNotFound(keyspace.to_string()))?;
        Ok(metadata.tables().map(|t| t.name().to_string()).collect())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> CatalogSnapshot {
        let keyspaces = self.keyspaces.read();
        CatalogSnapshot {
            keyspaces: keyspaces
                .values()
                .map(|ks| KeyspaceSnapshot {
                    name: ks.name().to_string(),
                    durable_writes: ks.durable_writes(),
                    tables: ks.tables().map(|t| (**t).clone()).collect(),
                })
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Result<Self, SchemaError> {
        let mut keyspaces = BTreeMap::new();
        for ks in snapshot.keyspaces {
            let mut metadata = KeyspaceMetadata::new(&ks.name, ks.durable_writes)?;
            for table in ks.tables {
                metadata = metadata.with_table_added(Arc::new(table));
            }
            keyspaces.insert(ks.name, Arc::new(metadata));
        }
        Ok(Self {
            keyspaces: RwLock::new(keyspaces),
        })
    }

    /// Write the store as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|e| StorageError::CorruptedCatalog(e.to_string()))?;
        std::fs::write(path, json).map_err(StorageError::from)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path).map_err(StorageError::from)?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::CorruptedCatalog(e.to_string()))?;
        Ok(Self::from_snapshot(snapshot)?)
    }
}
