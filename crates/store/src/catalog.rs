//! Bookkeeping tables and schema upgrades.
//!
//! Every collection lives in its own table (`rec_<name>`) with three kinds of
//! columns: `pk` (primary key, no type affinity so numbers and strings keep
//! their type), `body` (the JSON record) and one `ix_<index>` column per
//! secondary index. The applied schema and the database version are kept in
//! `store_catalog` and `store_meta` so a reopened database knows what it holds.

use std::collections::HashMap;

use sea_orm::{
    ConnectionTrait, DeriveIden,
    sea_query::{
        Alias, ColumnDef, Expr, Index, OnConflict, Query, Table, TableAlterStatement,
    },
};

use crate::{
    ResultStore, StoreError,
    record::{self, Record},
    schema::{CollectionSchema, IndexSchema, StoreDescriptor},
};

pub(crate) const PK_COLUMN: &str = "pk";
pub(crate) const BODY_COLUMN: &str = "body";
const VERSION_KEY: &str = "version";

#[derive(DeriveIden)]
enum StoreMeta {
    Table,
    Key,
    Value,
}

#[derive(DeriveIden)]
enum StoreCatalog {
    Table,
    Name,
    KeyPath,
    Indexes,
}

/// A collection as recorded in the catalog.
#[derive(Clone, Debug)]
pub(crate) struct Collection {
    pub schema: CollectionSchema,
}

impl Collection {
    pub fn table(&self) -> Alias {
        table_name(&self.schema.name)
    }

    pub fn pk(&self) -> Alias {
        Alias::new(PK_COLUMN)
    }

    pub fn body(&self) -> Alias {
        Alias::new(BODY_COLUMN)
    }

    pub fn index_column(&self, index: &str) -> ResultStore<Alias> {
        self.schema
            .find_index(index)
            .map(|index| index_column(&index.name))
            .ok_or_else(|| {
                StoreError::InvalidSchema(format!(
                    "index '{index}' not defined on collection '{}'",
                    self.schema.name
                ))
            })
    }

    /// Columns written by an upsert, in the order [`Collection::row`] yields
    /// values.
    pub fn columns(&self) -> Vec<Alias> {
        let mut columns = vec![self.pk(), self.body()];
        columns.extend(self.schema.indexes.iter().map(|i| index_column(&i.name)));
        columns
    }

    pub fn row(&self, record: &Record) -> ResultStore<Vec<sea_orm::Value>> {
        let key = record::primary_key(record, &self.schema.key_path)?;
        let mut values = vec![key.to_db(), serde_json::to_string(record)?.into()];
        values.extend(
            self.schema
                .indexes
                .iter()
                .map(|index| record::index_value(record, &index.key_path)),
        );
        Ok(values)
    }
}

fn table_name(collection: &str) -> Alias {
    Alias::new(format!("rec_{collection}"))
}

fn index_column(index: &str) -> Alias {
    Alias::new(format!("ix_{index}"))
}

fn index_name(collection: &str, index: &str) -> String {
    format!("idx-{collection}-{index}")
}

/// Untyped column: SQLite keeps integers as integers and text as text.
fn untyped(column: Alias) -> ColumnDef {
    ColumnDef::new(column).custom(Alias::new("BLOB")).to_owned()
}

/// Create the bookkeeping tables if the database is brand new.
pub(crate) async fn ensure_meta<C: ConnectionTrait>(conn: &C) -> ResultStore<()> {
    let backend = conn.get_database_backend();
    let meta = Table::create()
        .table(StoreMeta::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(StoreMeta::Key)
                .string()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(StoreMeta::Value).big_integer().not_null())
        .to_owned();
    conn.execute(backend.build(&meta)).await?;

    let catalog = Table::create()
        .table(StoreCatalog::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(StoreCatalog::Name)
                .string()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(StoreCatalog::KeyPath).string().not_null())
        .col(ColumnDef::new(StoreCatalog::Indexes).text().not_null())
        .to_owned();
    conn.execute(backend.build(&catalog)).await?;
    Ok(())
}

/// Stored database version; 0 for a database that was never upgraded.
pub(crate) async fn stored_version<C: ConnectionTrait>(conn: &C) -> ResultStore<u32> {
    let backend = conn.get_database_backend();
    let query = Query::select()
        .column(StoreMeta::Value)
        .from(StoreMeta::Table)
        .and_where(Expr::col(StoreMeta::Key).eq(VERSION_KEY))
        .to_owned();
    let row = conn.query_one(backend.build(&query)).await?;
    let version: i64 = match row {
        Some(row) => row.try_get("", "value")?,
        None => 0,
    };
    u32::try_from(version).map_err(|_| {
        StoreError::StoreUnavailable(format!("corrupt stored version {version}"))
    })
}

async fn set_version<C: ConnectionTrait>(conn: &C, version: u32) -> ResultStore<()> {
    let backend = conn.get_database_backend();
    let insert = Query::insert()
        .into_table(StoreMeta::Table)
        .columns([StoreMeta::Key, StoreMeta::Value])
        .values([VERSION_KEY.into(), i64::from(version).into()])
        .map_err(|e| StoreError::Database(sea_orm::DbErr::Custom(e.to_string())))?
        .on_conflict(
            OnConflict::column(StoreMeta::Key)
                .update_column(StoreMeta::Value)
                .to_owned(),
        )
        .to_owned();
    conn.execute(backend.build(&insert)).await?;
    Ok(())
}

/// Load every collection recorded in the catalog.
pub(crate) async fn load<C: ConnectionTrait>(
    conn: &C,
) -> ResultStore<HashMap<String, Collection>> {
    let backend = conn.get_database_backend();
    let query = Query::select()
        .columns([
            StoreCatalog::Name,
            StoreCatalog::KeyPath,
            StoreCatalog::Indexes,
        ])
        .from(StoreCatalog::Table)
        .to_owned();
    let rows = conn.query_all(backend.build(&query)).await?;

    let mut collections = HashMap::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("", "name")?;
        let key_path: String = row.try_get("", "key_path")?;
        let indexes: String = row.try_get("", "indexes")?;
        let indexes: Vec<IndexSchema> = serde_json::from_str(&indexes)?;
        collections.insert(
            name.clone(),
            Collection {
                schema: CollectionSchema {
                    name,
                    key_path,
                    indexes,
                },
            },
        );
    }
    Ok(collections)
}

async fn save<C: ConnectionTrait>(conn: &C, schema: &CollectionSchema) -> ResultStore<()> {
    let backend = conn.get_database_backend();
    let insert = Query::insert()
        .into_table(StoreCatalog::Table)
        .columns([
            StoreCatalog::Name,
            StoreCatalog::KeyPath,
            StoreCatalog::Indexes,
        ])
        .values([
            schema.name.clone().into(),
            schema.key_path.clone().into(),
            serde_json::to_string(&schema.indexes)?.into(),
        ])
        .map_err(|e| StoreError::Database(sea_orm::DbErr::Custom(e.to_string())))?
        .on_conflict(
            OnConflict::column(StoreCatalog::Name)
                .update_columns([StoreCatalog::KeyPath, StoreCatalog::Indexes])
                .to_owned(),
        )
        .to_owned();
    conn.execute(backend.build(&insert)).await?;
    Ok(())
}

/// Apply `descriptor` on top of what the catalog already holds, then record
/// the new version. Additive only: collections and indexes missing from the
/// descriptor are kept, and changing an existing key path or index is an
/// error. Must run inside a transaction.
pub(crate) async fn upgrade<C: ConnectionTrait>(
    conn: &C,
    descriptor: &StoreDescriptor,
) -> ResultStore<()> {
    let existing = load(conn).await?;

    for schema in &descriptor.stores {
        match existing.get(&schema.name) {
            None => create_collection(conn, schema).await?,
            Some(current) => extend_collection(conn, &current.schema, schema).await?,
        }
    }

    set_version(conn, descriptor.version).await
}

async fn create_collection<C: ConnectionTrait>(
    conn: &C,
    schema: &CollectionSchema,
) -> ResultStore<()> {
    let backend = conn.get_database_backend();
    let mut table = Table::create()
        .table(table_name(&schema.name))
        .if_not_exists()
        .col(untyped(Alias::new(PK_COLUMN)).not_null().primary_key())
        .col(ColumnDef::new(Alias::new(BODY_COLUMN)).text().not_null())
        .to_owned();
    for index in &schema.indexes {
        table.col(untyped(index_column(&index.name)));
    }
    conn.execute(backend.build(&table)).await?;

    for index in &schema.indexes {
        create_index(conn, &schema.name, index).await?;
    }
    save(conn, schema).await?;
    tracing::debug!(
        "created collection {} ({} index(es))",
        schema.name,
        schema.indexes.len()
    );
    Ok(())
}

async fn extend_collection<C: ConnectionTrait>(
    conn: &C,
    current: &CollectionSchema,
    requested: &CollectionSchema,
) -> ResultStore<()> {
    if current.key_path != requested.key_path {
        return Err(StoreError::InvalidSchema(format!(
            "collection '{}' already uses key path '{}'",
            current.name, current.key_path
        )));
    }

    let mut merged = current.clone();
    for index in &requested.indexes {
        match current.find_index(&index.name) {
            Some(known) if known == index => {}
            Some(_) => {
                return Err(StoreError::InvalidSchema(format!(
                    "index '{}' on collection '{}' cannot be redefined",
                    index.name, current.name
                )));
            }
            None => {
                add_index(conn, current, index).await?;
                merged.indexes.push(index.clone());
            }
        }
    }

    if merged.indexes.len() != current.indexes.len() {
        save(conn, &merged).await?;
    }
    Ok(())
}

/// Add an index column to an existing table and fill it from the stored
/// records before the index (possibly unique) is built.
async fn add_index<C: ConnectionTrait>(
    conn: &C,
    current: &CollectionSchema,
    index: &IndexSchema,
) -> ResultStore<()> {
    let backend = conn.get_database_backend();
    let table = table_name(&current.name);
    let column = index_column(&index.name);

    let alter: TableAlterStatement = Table::alter()
        .table(table.clone())
        .add_column(untyped(column.clone()))
        .to_owned();
    conn.execute(backend.build(&alter)).await?;

    let select = Query::select()
        .column(Alias::new(BODY_COLUMN))
        .from(table.clone())
        .to_owned();
    let rows = conn.query_all(backend.build(&select)).await?;
    for row in rows {
        let body: String = row.try_get("", BODY_COLUMN)?;
        let record: Record = serde_json::from_str(&body)?;
        let key = record::primary_key(&record, &current.key_path)?;
        let update = Query::update()
            .table(table.clone())
            .value(column.clone(), record::index_value(&record, &index.key_path))
            .and_where(Expr::col(Alias::new(PK_COLUMN)).eq(key.to_db()))
            .to_owned();
        conn.execute(backend.build(&update)).await?;
    }

    create_index(conn, &current.name, index).await?;
    tracing::debug!("added index {} to collection {}", index.name, current.name);
    Ok(())
}

async fn create_index<C: ConnectionTrait>(
    conn: &C,
    collection: &str,
    index: &IndexSchema,
) -> ResultStore<()> {
    let backend = conn.get_database_backend();
    let mut statement = Index::create()
        .name(index_name(collection, &index.name))
        .table(table_name(collection))
        .col(index_column(&index.name))
        .if_not_exists()
        .to_owned();
    if index.unique {
        statement.unique();
    }
    conn.execute(backend.build(&statement))
        .await
        .map_err(StoreError::from_write)?;
    Ok(())
}
