//! Store descriptor: database name, version and the collections it holds.
//!
//! Accepts both the snake_case keys used in `settings.toml` and camelCase
//! keys (`dbName`, `keyPath`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{ResultStore, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    #[serde(alias = "dbName")]
    pub db_name: String,
    pub version: u32,
    #[serde(default)]
    pub stores: Vec<CollectionSchema>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    /// Field holding the primary key. Dotted paths reach into nested objects.
    #[serde(alias = "keyPath")]
    pub key_path: String,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    #[serde(alias = "keyPath")]
    pub key_path: String,
    #[serde(default)]
    pub unique: bool,
}

impl StoreDescriptor {
    pub fn new(db_name: impl Into<String>, version: u32) -> Self {
        Self {
            db_name: db_name.into(),
            version,
            stores: Vec::new(),
        }
    }

    #[must_use]
    pub fn collection(mut self, schema: CollectionSchema) -> Self {
        self.stores.push(schema);
        self
    }

    pub(crate) fn validate(&self) -> ResultStore<()> {
        // The name becomes a file name under the data directory.
        if !is_identifier(&self.db_name) {
            return Err(StoreError::InvalidSchema(format!(
                "invalid database name '{}'",
                self.db_name
            )));
        }
        if self.version == 0 {
            return Err(StoreError::InvalidSchema(
                "version must be >= 1".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for store in &self.stores {
            store.validate()?;
            if !names.insert(store.name.as_str()) {
                return Err(StoreError::InvalidSchema(format!(
                    "collection '{}' declared twice",
                    store.name
                )));
            }
        }
        Ok(())
    }
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn index(mut self, name: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        });
        self
    }

    #[must_use]
    pub fn unique_index(mut self, name: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            key_path: key_path.into(),
            unique: true,
        });
        self
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }

    fn validate(&self) -> ResultStore<()> {
        if !is_identifier(&self.name) {
            return Err(StoreError::InvalidSchema(format!(
                "invalid collection name '{}'",
                self.name
            )));
        }
        if self.key_path.trim().is_empty() {
            return Err(StoreError::InvalidSchema(format!(
                "collection '{}' has an empty key path",
                self.name
            )));
        }
        let mut names = HashSet::new();
        for index in &self.indexes {
            if !is_identifier(&index.name) || index.key_path.trim().is_empty() {
                return Err(StoreError::InvalidSchema(format!(
                    "invalid index '{}' on collection '{}'",
                    index.name, self.name
                )));
            }
            if !names.insert(index.name.as_str()) {
                return Err(StoreError::InvalidSchema(format!(
                    "index '{}' declared twice on collection '{}'",
                    index.name, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Collection and index names end up in table and column names.
fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
