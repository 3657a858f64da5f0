//! Local record store backed by an embedded SQLite database.
//!
//! A [`LocalStore`] is an explicit handle: create it, [`open`] it with a
//! [`StoreDescriptor`], use it, [`close`] it. Several handles can live side
//! by side (tests rely on that); nothing here is process-global.
//!
//! Every operation runs as its own transaction. Schema upgrades hold the
//! handle's write lock, so no read or write can observe a half-applied
//! upgrade.
//!
//! [`open`]: LocalStore::open
//! [`close`]: LocalStore::close

use std::{collections::HashMap, path::PathBuf, time::Duration};

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, TransactionTrait,
    sea_query::{Alias, Expr, OnConflict, Order, Query, SelectStatement},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

pub use error::StoreError;
pub use record::{Key, Record};
pub use schema::{CollectionSchema, IndexSchema, StoreDescriptor};

use catalog::Collection;

mod catalog;
mod error;
mod record;
mod schema;

type ResultStore<T> = Result<T, StoreError>;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($conn:expr, |$tx:ident| $body:expr) => {{
        let $tx = $conn.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// Where and how the database files are opened.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Directory holding `<db_name>.db`. `None` keeps the database in memory.
    pub data_dir: Option<PathBuf>,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_connections: 4,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreOptions {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn on_disk(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    fn url(&self, db_name: &str) -> String {
        match &self.data_dir {
            Some(dir) => format!("sqlite:{}?mode=rwc", dir.join(format!("{db_name}.db")).display()),
            None => String::from("sqlite::memory:"),
        }
    }
}

#[derive(Debug)]
struct OpenStore {
    db_name: String,
    version: u32,
    connection: DatabaseConnection,
    collections: HashMap<String, Collection>,
}

impl OpenStore {
    fn collection(&self, name: &str) -> ResultStore<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }
}

fn opened(state: &Option<OpenStore>) -> ResultStore<&OpenStore> {
    state.as_ref().ok_or(StoreError::NotInitialized)
}

/// Handle to a versioned local database of record collections.
#[derive(Debug)]
pub struct LocalStore {
    options: StoreOptions,
    state: RwLock<Option<OpenStore>>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl LocalStore {
    /// Create an unopened handle. Every operation fails with
    /// [`StoreError::NotInitialized`] until [`LocalStore::open`] succeeds.
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            state: RwLock::new(None),
        }
    }

    /// Open the database described by `descriptor`, upgrading its schema when
    /// `descriptor.version` is newer than the stored one.
    ///
    /// - Opening the same name and version again is a no-op.
    /// - Opening the same name with a newer version upgrades in place; if the
    ///   upgrade fails the handle stays open at the previous version.
    /// - Opening another name closes the current database first.
    pub async fn open(&self, descriptor: &StoreDescriptor) -> ResultStore<()> {
        descriptor.validate()?;
        let mut state = self.state.write().await;

        if let Some(open) = state
            .as_mut()
            .filter(|open| open.db_name == descriptor.db_name)
        {
            if open.version == descriptor.version {
                return Ok(());
            }
            if descriptor.version < open.version {
                return Err(StoreError::VersionConflict {
                    requested: descriptor.version,
                    stored: open.version,
                });
            }
            // Upgrade in place. A failed upgrade rolls back and the handle
            // keeps serving the previous version.
            let collections = match Self::prepare(&open.connection, descriptor).await {
                Ok(collections) => collections,
                Err(err) => {
                    tracing::error!(
                        "failed to upgrade store {} from version {} to {}: {err}",
                        descriptor.db_name,
                        open.version,
                        descriptor.version
                    );
                    return Err(err);
                }
            };
            open.version = descriptor.version;
            open.collections = collections;
            tracing::info!(
                "store {} upgraded to version {}",
                descriptor.db_name,
                descriptor.version
            );
            return Ok(());
        }

        if let Some(previous) = state.take() {
            tracing::info!("closing store {} to open {}", previous.db_name, descriptor.db_name);
            previous.connection.close().await?;
        }
        let connection = self.connect(&descriptor.db_name).await?;

        // A database that fails to prepare is closed again; the handle stays
        // closed.
        let collections = match Self::prepare(&connection, descriptor).await {
            Ok(collections) => collections,
            Err(err) => {
                tracing::error!("failed to prepare store {}: {err}", descriptor.db_name);
                if let Err(close_err) = connection.close().await {
                    tracing::warn!("failed to close store {}: {close_err}", descriptor.db_name);
                }
                return Err(err);
            }
        };
        tracing::info!(
            "store {} ready at version {} ({} collection(s))",
            descriptor.db_name,
            descriptor.version,
            collections.len()
        );
        *state = Some(OpenStore {
            db_name: descriptor.db_name.clone(),
            version: descriptor.version,
            connection,
            collections,
        });
        Ok(())
    }

    async fn connect(&self, db_name: &str) -> ResultStore<DatabaseConnection> {
        if let Some(dir) = &self.options.data_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| StoreError::StoreUnavailable(err.to_string()))?;
        }

        let mut options = ConnectOptions::new(self.options.url(db_name));
        options
            .connect_timeout(self.options.connect_timeout)
            .sqlx_logging(false);
        if self.options.data_dir.is_some() {
            options.max_connections(self.options.max_connections.max(1));
        } else {
            // Each pooled connection to `:memory:` is a distinct database, and
            // a reaped connection takes its data with it.
            let forever = Duration::from_secs(u64::from(u32::MAX));
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(forever)
                .max_lifetime(forever);
        }

        Database::connect(options).await.map_err(|err| {
            tracing::error!("failed to open store {db_name}: {err}");
            StoreError::StoreUnavailable(err.to_string())
        })
    }

    async fn prepare(
        connection: &DatabaseConnection,
        descriptor: &StoreDescriptor,
    ) -> ResultStore<HashMap<String, Collection>> {
        catalog::ensure_meta(connection).await?;
        let stored = catalog::stored_version(connection).await?;
        if descriptor.version < stored {
            return Err(StoreError::VersionConflict {
                requested: descriptor.version,
                stored,
            });
        }
        if descriptor.version > stored {
            tracing::info!(
                "upgrading store {} from version {stored} to {}",
                descriptor.db_name,
                descriptor.version
            );
            with_tx!(connection, |tx| catalog::upgrade(&tx, descriptor).await)?;
        }
        catalog::load(connection).await
    }

    /// Close the database. Safe to call when the handle was never opened.
    pub async fn close(&self) -> ResultStore<()> {
        let mut state = self.state.write().await;
        if let Some(open) = state.take() {
            tracing::info!("closing store {}", open.db_name);
            open.connection.close().await?;
        }
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Version of the opened database.
    pub async fn version(&self) -> ResultStore<u32> {
        let state = self.state.read().await;
        Ok(opened(&state)?.version)
    }

    /// Names of the collections in the opened database, sorted.
    pub async fn collections(&self) -> ResultStore<Vec<String>> {
        let state = self.state.read().await;
        let mut names: Vec<String> = opened(&state)?.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Point lookup by primary key.
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: impl Into<Key>,
    ) -> ResultStore<Option<T>> {
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;
        let key = key.into();

        let query = Query::select()
            .column(collection.body())
            .from(collection.table())
            .and_where(Expr::col(collection.pk()).eq(key.to_db()))
            .to_owned();
        let backend = open.connection.get_database_backend();
        let row = open.connection.query_one(backend.build(&query)).await?;
        match row {
            Some(row) => {
                let body: String = row.try_get("", catalog::BODY_COLUMN)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the record with the same primary key.
    pub async fn put<T: Serialize + ?Sized>(&self, collection: &str, value: &T) -> ResultStore<()> {
        let record = record::to_record(value)?;
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;
        let row = collection.row(&record)?;

        with_tx!(open.connection, |tx| upsert(&tx, collection, row).await)
    }

    /// Upsert every record in one transaction: all of them land or none do.
    pub async fn batch_put<T: Serialize>(&self, collection: &str, values: &[T]) -> ResultStore<()> {
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;

        let mut rows = Vec::with_capacity(values.len());
        for value in values {
            let record = record::to_record(value)?;
            rows.push(collection.row(&record)?);
        }

        let written = rows.len();
        with_tx!(open.connection, |tx| {
            let mut result = Ok(());
            for row in rows {
                result = upsert(&tx, collection, row).await;
                if result.is_err() {
                    break;
                }
            }
            result
        })?;
        tracing::debug!("batch wrote {written} record(s) to {}", collection.schema.name);
        Ok(())
    }

    /// Remove the record with `key`. Removing a missing key is not an error.
    pub async fn delete(&self, collection: &str, key: impl Into<Key>) -> ResultStore<()> {
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;
        let key = key.into();

        let statement = Query::delete()
            .from_table(collection.table())
            .and_where(Expr::col(collection.pk()).eq(key.to_db()))
            .to_owned();
        let backend = open.connection.get_database_backend();
        with_tx!(open.connection, |tx| tx
            .execute(backend.build(&statement))
            .await
            .map(|_| ())
            .map_err(StoreError::from))
    }

    /// Every record, ordered by primary key (numbers first, then strings).
    pub async fn list<T: DeserializeOwned>(&self, collection: &str) -> ResultStore<Vec<T>> {
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;

        let query = Query::select()
            .column(collection.body())
            .from(collection.table())
            .order_by(collection.pk(), Order::Asc)
            .to_owned();
        read_bodies(&open.connection, &query).await
    }

    /// Records whose `index` field equals `value`, ordered by primary key.
    pub async fn list_by_index<T: DeserializeOwned>(
        &self,
        collection: &str,
        index: &str,
        value: impl Into<serde_json::Value>,
    ) -> ResultStore<Vec<T>> {
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;
        let column = collection.index_column(index)?;

        let value = value.into();
        if value.is_null() {
            return Ok(Vec::new());
        }
        let query = Query::select()
            .column(collection.body())
            .from(collection.table())
            .and_where(Expr::col(column).eq(record::json_to_db(&value)))
            .order_by(collection.pk(), Order::Asc)
            .to_owned();
        read_bodies(&open.connection, &query).await
    }

    /// Primary keys, ascending.
    pub async fn keys(&self, collection: &str) -> ResultStore<Vec<Key>> {
        let key_path = {
            let state = self.state.read().await;
            opened(&state)?.collection(collection)?.schema.key_path.clone()
        };
        let records: Vec<Record> = self.list(collection).await?;
        records
            .iter()
            .map(|record| record::primary_key(record, &key_path))
            .collect()
    }

    pub async fn count(&self, collection: &str) -> ResultStore<u64> {
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;

        let query = Query::select()
            .expr_as(Expr::cust("COUNT(*)"), Alias::new("total"))
            .from(collection.table())
            .to_owned();
        let backend = open.connection.get_database_backend();
        let row = open.connection.query_one(backend.build(&query)).await?;
        let total: i64 = match row {
            Some(row) => row.try_get("", "total")?,
            None => 0,
        };
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// Remove every record of `collection`.
    pub async fn clear(&self, collection: &str) -> ResultStore<()> {
        let state = self.state.read().await;
        let open = opened(&state)?;
        let collection = open.collection(collection)?;

        let statement = Query::delete().from_table(collection.table()).to_owned();
        let backend = open.connection.get_database_backend();
        with_tx!(open.connection, |tx| tx
            .execute(backend.build(&statement))
            .await
            .map(|_| ())
            .map_err(StoreError::from))?;
        tracing::debug!("cleared collection {}", collection.schema.name);
        Ok(())
    }
}

async fn upsert<C: ConnectionTrait>(
    conn: &C,
    collection: &Collection,
    row: Vec<sea_orm::Value>,
) -> ResultStore<()> {
    let mut update = vec![collection.body()];
    update.extend(collection.columns().into_iter().skip(2));

    let insert = Query::insert()
        .into_table(collection.table())
        .columns(collection.columns())
        .values(row.into_iter().map(Into::into))
        .map_err(|e| StoreError::Database(sea_orm::DbErr::Custom(e.to_string())))?
        .on_conflict(
            OnConflict::column(collection.pk())
                .update_columns(update)
                .to_owned(),
        )
        .to_owned();
    let backend = conn.get_database_backend();
    conn.execute(backend.build(&insert))
        .await
        .map_err(StoreError::from_write)?;
    Ok(())
}

async fn read_bodies<C: ConnectionTrait, T: DeserializeOwned>(
    conn: &C,
    query: &SelectStatement,
) -> ResultStore<Vec<T>> {
    let backend = conn.get_database_backend();
    let rows = conn.query_all(backend.build(query)).await?;
    rows.into_iter()
        .map(|row| -> ResultStore<T> {
            let body: String = row.try_get("", catalog::BODY_COLUMN)?;
            Ok(serde_json::from_str(&body)?)
        })
        .collect()
}
