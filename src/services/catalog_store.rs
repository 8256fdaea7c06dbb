//! Catalog store: one SQLite database per catalog schema.
//!
//! A schema named `storage_console` lives in `<data_dir>/storage_console.sqlite`.
//! Pools are opened lazily, the embedded DDL is applied on open, and every
//! pipeline stage works inside a single transaction taken from
//! [`CatalogStore::begin`]. The free functions below are the typed operations
//! the stages issue against that transaction's connection; none of them
//! commits.

use crate::{
    errors::PipelineError,
    models::{
        blob::{Blob, BlobMetadata, MetadataStatus},
        bucket::Bucket,
        directory::Directory,
        object::Object,
        property::{BlobProperty, DONE_PROPERTY, PropertyRow},
    },
    services::pipeline::validate_schema_name,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

const CATALOG_DDL: &str = include_str!("../../migrations/0001_catalog.sql");

/// Open (creating if needed) a SQLite database and apply `ddl` to it.
pub(crate) async fn open_database(path: &Path, ddl: &str) -> Result<SqlitePool, PipelineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    apply_ddl(&pool, ddl).await?;
    Ok(pool)
}

/// Execute each `;`-separated statement of an embedded schema file.
async fn apply_ddl(pool: &SqlitePool, sql: &str) -> Result<(), sqlx::Error> {
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("applying {} schema statements", statements.len());
    for stmt in statements {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct CatalogStore {
    data_dir: PathBuf,
    pools: Arc<Mutex<HashMap<String, SqlitePool>>>,
}

impl CatalogStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn schema_path(&self, schema: &str) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite", schema))
    }

    /// The pool for `schema`, opening the database on first use.
    pub async fn pool(&self, schema: &str) -> Result<SqlitePool, PipelineError> {
        validate_schema_name(schema)?;

        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(schema) {
            return Ok(pool.clone());
        }

        let path = self.schema_path(schema);
        let pool = open_database(&path, CATALOG_DDL).await?;
        info!(schema, path = %path.display(), "opened catalog schema");
        pools.insert(schema.to_string(), pool.clone());
        Ok(pool)
    }

    /// Begin the run-wide transaction for `schema`. Dropping it without
    /// committing rolls everything back.
    pub async fn begin(&self, schema: &str) -> Result<Transaction<'static, Sqlite>, PipelineError> {
        let pool = self.pool(schema).await?;
        Ok(pool.begin().await?)
    }
}

/// A blob still owed work by some processor or extractor, together with one
/// live key that references it.
#[derive(Clone, Debug, FromRow)]
pub struct OwedBlob {
    pub blob_id: i64,
    pub content_hash: String,
    pub size: i64,
    pub content_type: String,
    pub key: String,
}

/// Row totals, mostly for tests and reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub live_objects: i64,
    pub deleted_objects: i64,
    pub blobs: i64,
    pub links: i64,
    pub directories: i64,
}

// ---------------------------------------------------------------------------
// Buckets and directories
// ---------------------------------------------------------------------------

pub async fn find_bucket(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Bucket>, sqlx::Error> {
    sqlx::query_as::<_, Bucket>(
        "SELECT id, name, provider, created_at FROM buckets WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn find_or_create_bucket(
    conn: &mut SqliteConnection,
    name: &str,
    provider: &str,
) -> Result<Bucket, sqlx::Error> {
    if let Some(bucket) = find_bucket(conn, name).await? {
        return Ok(bucket);
    }

    debug!(bucket = name, provider, "creating bucket row");
    sqlx::query_as::<_, Bucket>(
        r#"
        INSERT INTO buckets (name, provider, created_at)
        VALUES (?, ?, ?)
        RETURNING id, name, provider, created_at
        "#,
    )
    .bind(name)
    .bind(provider)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
}

/// Directory id for `(bucket, parent, name)`, created if missing. The bucket
/// root is the directory with no parent and an empty name.
pub async fn find_or_create_directory(
    conn: &mut SqliteConnection,
    bucket_id: i64,
    parent_id: Option<i64>,
    name: &str,
) -> Result<i64, sqlx::Error> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM directories WHERE bucket_id = ? AND parent_id IS ? AND name = ?",
    )
    .bind(bucket_id)
    .bind(parent_id)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO directories (bucket_id, parent_id, name, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(bucket_id)
    .bind(parent_id)
    .bind(name)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
}

pub async fn list_directories(
    conn: &mut SqliteConnection,
    bucket_id: i64,
) -> Result<Vec<Directory>, sqlx::Error> {
    sqlx::query_as::<_, Directory>(
        r#"
        SELECT id, bucket_id, parent_id, name, created_at
        FROM directories WHERE bucket_id = ? ORDER BY id
        "#,
    )
    .bind(bucket_id)
    .fetch_all(&mut *conn)
    .await
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// The object row at `key`, live or soft-deleted.
pub async fn find_object(
    conn: &mut SqliteConnection,
    bucket_id: i64,
    key: &str,
) -> Result<Option<Object>, sqlx::Error> {
    sqlx::query_as::<_, Object>(
        r#"
        SELECT id, bucket_id, directory_id, name, key, created_at, deleted_at
        FROM objects WHERE bucket_id = ? AND key = ?
        "#,
    )
    .bind(bucket_id)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await
}

/// Keys of live objects in the bucket, optionally limited to a key prefix.
pub async fn live_object_keys(
    conn: &mut SqliteConnection,
    bucket_id: i64,
    prefix: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let keys = sqlx::query_scalar::<_, String>(
        r#"
        SELECT key FROM objects
        WHERE bucket_id = ? AND deleted_at IS NULL
          AND substr(key, 1, length(?)) = ?
        "#,
    )
    .bind(bucket_id)
    .bind(prefix)
    .bind(prefix)
    .fetch_all(&mut *conn)
    .await?;
    Ok(keys.into_iter().collect())
}

/// Make sure a live object row exists for `key`. Returns its id and whether
/// this call created it (or revived a soft-deleted row).
pub async fn upsert_object(
    conn: &mut SqliteConnection,
    bucket_id: i64,
    directory_id: i64,
    name: &str,
    key: &str,
) -> Result<(i64, bool), sqlx::Error> {
    let existing = sqlx::query_as::<_, (i64, Option<DateTime<Utc>>)>(
        "SELECT id, deleted_at FROM objects WHERE bucket_id = ? AND key = ?",
    )
    .bind(bucket_id)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some((id, None)) => Ok((id, false)),
        Some((id, Some(_))) => {
            sqlx::query("UPDATE objects SET deleted_at = NULL, directory_id = ?, name = ? WHERE id = ?")
                .bind(directory_id)
                .bind(name)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            Ok((id, true))
        }
        None => {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO objects (bucket_id, directory_id, name, key, created_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(bucket_id)
            .bind(directory_id)
            .bind(name)
            .bind(key)
            .bind(Utc::now())
            .fetch_one(&mut *conn)
            .await?;
            Ok((id, true))
        }
    }
}

/// Soft-delete the live object at `key` and drop its blob links. Returns
/// whether a row was deleted.
pub async fn soft_delete_object(
    conn: &mut SqliteConnection,
    bucket_id: i64,
    key: &str,
) -> Result<bool, sqlx::Error> {
    let deleted = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE objects SET deleted_at = ?
        WHERE bucket_id = ? AND key = ? AND deleted_at IS NULL
        RETURNING id
        "#,
    )
    .bind(Utc::now())
    .bind(bucket_id)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(object_id) = deleted else {
        return Ok(false);
    };
    sqlx::query("DELETE FROM object_blobs WHERE object_id = ?")
        .bind(object_id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Blobs, content types and links
// ---------------------------------------------------------------------------

pub async fn find_blob_by_hash(
    conn: &mut SqliteConnection,
    content_hash: &str,
) -> Result<Option<Blob>, sqlx::Error> {
    sqlx::query_as::<_, Blob>(
        r#"
        SELECT id, content_hash, size, last_modified, content_type_id
        FROM blobs WHERE content_hash = ?
        "#,
    )
    .bind(content_hash)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn find_or_create_content_type(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO content_types (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    sqlx::query_scalar::<_, i64>("SELECT id FROM content_types WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
}

pub async fn insert_blob(
    conn: &mut SqliteConnection,
    content_hash: &str,
    size: i64,
    last_modified: DateTime<Utc>,
    content_type_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO blobs (content_hash, size, last_modified, content_type_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(content_hash)
    .bind(size)
    .bind(last_modified)
    .bind(content_type_id)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
}

/// Point `object_id` at `blob_id`, removing any link to a previous blob.
/// Returns whether a new link row was inserted.
pub async fn link_object_blob(
    conn: &mut SqliteConnection,
    object_id: i64,
    blob_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query("DELETE FROM object_blobs WHERE object_id = ? AND blob_id <> ?")
        .bind(object_id)
        .bind(blob_id)
        .execute(&mut *conn)
        .await?;

    let inserted = sqlx::query("INSERT OR IGNORE INTO object_blobs (object_id, blob_id) VALUES (?, ?)")
        .bind(object_id)
        .bind(blob_id)
        .execute(&mut *conn)
        .await?;
    Ok(inserted.rows_affected() == 1)
}

/// Delete every blob with no remaining object links, together with its
/// metadata flags and properties. Returns the number of blobs removed.
pub async fn prune_disattached_blobs(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    const DISATTACHED: &str =
        "SELECT b.id FROM blobs b WHERE NOT EXISTS (SELECT 1 FROM object_blobs ob WHERE ob.blob_id = b.id)";

    sqlx::query(&format!("DELETE FROM blob_properties WHERE blob_id IN ({})", DISATTACHED))
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!("DELETE FROM blob_metadata WHERE blob_id IN ({})", DISATTACHED))
        .execute(&mut *conn)
        .await?;
    let pruned = sqlx::query(&format!("DELETE FROM blobs WHERE id IN ({})", DISATTACHED))
        .execute(&mut *conn)
        .await?;
    Ok(pruned.rows_affected())
}

// ---------------------------------------------------------------------------
// Metadata flags
// ---------------------------------------------------------------------------

const OWED_BLOB_COLUMNS: &str = r#"
    SELECT b.id AS blob_id, b.content_hash, b.size, ct.name AS content_type, MIN(o.key) AS key
    FROM blobs b
    JOIN content_types ct ON ct.id = b.content_type_id
    JOIN object_blobs ob ON ob.blob_id = b.id
    JOIN objects o ON o.id = ob.object_id
    WHERE o.deleted_at IS NULL AND o.bucket_id = "#;

const OWED_BLOB_GROUPING: &str =
    " GROUP BY b.id, b.content_hash, b.size, ct.name ORDER BY b.content_hash";

/// Blobs linked from live objects in the bucket whose content type is one of
/// `content_types` and that have no flag yet for `processor`.
pub async fn blobs_owing_processor(
    conn: &mut SqliteConnection,
    bucket_id: i64,
    processor: &str,
    content_types: &[&str],
    prefix: &str,
) -> Result<Vec<OwedBlob>, sqlx::Error> {
    if content_types.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(OWED_BLOB_COLUMNS);
    builder.push_bind(bucket_id);

    builder.push(" AND ct.name IN (");
    let mut separated = builder.separated(", ");
    for content_type in content_types {
        separated.push_bind(content_type.to_string());
    }
    separated.push_unseparated(")");

    builder.push(
        " AND NOT EXISTS (SELECT 1 FROM blob_metadata m WHERE m.blob_id = b.id AND m.processor = ",
    );
    builder.push_bind(processor.to_string());
    builder.push(")");

    if !prefix.is_empty() {
        builder.push(" AND substr(o.key, 1, length(");
        builder.push_bind(prefix.to_string());
        builder.push(")) = ");
        builder.push_bind(prefix.to_string());
    }

    builder.push(OWED_BLOB_GROUPING);
    builder.build_query_as::<OwedBlob>().fetch_all(&mut *conn).await
}

pub async fn upsert_metadata_status(
    conn: &mut SqliteConnection,
    blob_id: i64,
    processor: &str,
    status: MetadataStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO blob_metadata (blob_id, processor, status, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (blob_id, processor) DO UPDATE
        SET status = excluded.status, updated_at = excluded.updated_at
        "#,
    )
    .bind(blob_id)
    .bind(processor)
    .bind(status.as_str())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn metadata_for_blob(
    conn: &mut SqliteConnection,
    blob_id: i64,
) -> Result<Vec<BlobMetadata>, sqlx::Error> {
    sqlx::query_as::<_, BlobMetadata>(
        r#"
        SELECT blob_id, processor, status, updated_at
        FROM blob_metadata WHERE blob_id = ? ORDER BY processor
        "#,
    )
    .bind(blob_id)
    .fetch_all(&mut *conn)
    .await
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Blobs linked from live objects in the bucket whose `source` metadata
/// succeeded and that carry no `Done` marker for `source` yet.
pub async fn blobs_owing_properties(
    conn: &mut SqliteConnection,
    bucket_id: i64,
    source: &str,
) -> Result<Vec<OwedBlob>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(OWED_BLOB_COLUMNS);
    builder.push_bind(bucket_id);

    builder.push(
        " AND EXISTS (SELECT 1 FROM blob_metadata m WHERE m.blob_id = b.id AND m.status = 'success' AND m.processor = ",
    );
    builder.push_bind(source.to_string());
    builder.push(")");

    builder.push(
        " AND NOT EXISTS (SELECT 1 FROM blob_properties p WHERE p.blob_id = b.id AND p.source = ",
    );
    builder.push_bind(source.to_string());
    builder.push(" AND p.property_type = ");
    builder.push_bind(DONE_PROPERTY);
    builder.push(")");

    builder.push(OWED_BLOB_GROUPING);
    builder.build_query_as::<OwedBlob>().fetch_all(&mut *conn).await
}

/// Replace every property row of `(blob, source)` with `properties` plus the
/// `Done` marker.
pub async fn replace_properties(
    conn: &mut SqliteConnection,
    blob_id: i64,
    source: &str,
    properties: &[BlobProperty],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM blob_properties WHERE blob_id = ? AND source = ?")
        .bind(blob_id)
        .bind(source)
        .execute(&mut *conn)
        .await?;

    let done = BlobProperty::done(source);
    let rows = properties.iter().chain(std::iter::once(&done));

    let mut builder = QueryBuilder::<Sqlite>::new(
        "INSERT INTO blob_properties (blob_id, source, property_type, value_type, \
         value_bool, value_text, value_integer, value_float, value_numerator, \
         value_denominator, value_timestamp, value_timestamptz) ",
    );
    builder.push_values(rows, |mut row, property| {
        let cols = property.value.columns();
        row.push_bind(blob_id)
            .push_bind(source.to_string())
            .push_bind(property.property_type.clone())
            .push_bind(property.value.value_type())
            .push_bind(cols.value_bool)
            .push_bind(cols.value_text)
            .push_bind(cols.value_integer)
            .push_bind(cols.value_float)
            .push_bind(cols.value_numerator)
            .push_bind(cols.value_denominator)
            .push_bind(cols.value_timestamp)
            .push_bind(cols.value_timestamptz);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

pub async fn properties_for_blob(
    conn: &mut SqliteConnection,
    blob_id: i64,
) -> Result<Vec<BlobProperty>, PipelineError> {
    let rows = sqlx::query_as::<_, PropertyRow>(
        r#"
        SELECT blob_id, source, property_type, value_type, value_bool, value_text,
               value_integer, value_float, value_numerator, value_denominator,
               value_timestamp, value_timestamptz
        FROM blob_properties WHERE blob_id = ? ORDER BY source, id
        "#,
    )
    .bind(blob_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| BlobProperty::try_from(row).map_err(PipelineError::from))
        .collect()
}

pub async fn catalog_counts(conn: &mut SqliteConnection) -> Result<CatalogCounts, sqlx::Error> {
    let (live_objects, deleted_objects, blobs, links, directories) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM objects WHERE deleted_at IS NULL),
                (SELECT COUNT(*) FROM objects WHERE deleted_at IS NOT NULL),
                (SELECT COUNT(*) FROM blobs),
                (SELECT COUNT(*) FROM object_blobs),
                (SELECT COUNT(*) FROM directories)
            "#,
        )
        .fetch_one(&mut *conn)
        .await?;

    Ok(CatalogCounts {
        live_objects,
        deleted_objects,
        blobs,
        links,
        directories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::property::PropertyValue;
    use tempfile::TempDir;

    async fn store() -> (TempDir, CatalogStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn opens_one_database_per_schema() {
        let (dir, store) = store().await;
        store.pool("alpha").await.unwrap();
        store.pool("beta_2").await.unwrap();
        assert!(dir.path().join("alpha.sqlite").exists());
        assert!(dir.path().join("beta_2.sqlite").exists());
        assert!(store.pool("Bad-Name").await.is_err());
    }

    #[tokio::test]
    async fn directories_are_unique_per_parent() {
        let (_dir, store) = store().await;
        let mut tx = store.begin("catalog").await.unwrap();
        let bucket = find_or_create_bucket(&mut tx, "photos", "memory").await.unwrap();
        let again = find_or_create_bucket(&mut tx, "photos", "memory").await.unwrap();
        assert_eq!(bucket.id, again.id);

        let root = find_or_create_directory(&mut tx, bucket.id, None, "").await.unwrap();
        assert_eq!(
            find_or_create_directory(&mut tx, bucket.id, None, "").await.unwrap(),
            root
        );
        let a = find_or_create_directory(&mut tx, bucket.id, Some(root), "a").await.unwrap();
        let nested = find_or_create_directory(&mut tx, bucket.id, Some(a), "a").await.unwrap();
        assert_ne!(a, nested);
        assert_eq!(catalog_counts(&mut tx).await.unwrap().directories, 3);
    }

    #[tokio::test]
    async fn soft_deleted_objects_are_revived() {
        let (_dir, store) = store().await;
        let mut tx = store.begin("catalog").await.unwrap();
        let bucket = find_or_create_bucket(&mut tx, "photos", "memory").await.unwrap();
        let root = find_or_create_directory(&mut tx, bucket.id, None, "").await.unwrap();

        let (id, created) = upsert_object(&mut tx, bucket.id, root, "a.jpg", "a.jpg").await.unwrap();
        assert!(created);
        assert_eq!(
            upsert_object(&mut tx, bucket.id, root, "a.jpg", "a.jpg").await.unwrap(),
            (id, false)
        );

        assert!(soft_delete_object(&mut tx, bucket.id, "a.jpg").await.unwrap());
        assert!(!soft_delete_object(&mut tx, bucket.id, "a.jpg").await.unwrap());
        let object = find_object(&mut tx, bucket.id, "a.jpg").await.unwrap().unwrap();
        assert_eq!((object.id, object.directory_id), (id, root));
        assert!(object.deleted_at.is_some());
        assert!(live_object_keys(&mut tx, bucket.id, "").await.unwrap().is_empty());

        assert_eq!(
            upsert_object(&mut tx, bucket.id, root, "a.jpg", "a.jpg").await.unwrap(),
            (id, true)
        );
    }

    #[tokio::test]
    async fn relinking_replaces_the_previous_blob() {
        let (_dir, store) = store().await;
        let mut tx = store.begin("catalog").await.unwrap();
        let bucket = find_or_create_bucket(&mut tx, "photos", "memory").await.unwrap();
        let root = find_or_create_directory(&mut tx, bucket.id, None, "").await.unwrap();
        let (object, _) = upsert_object(&mut tx, bucket.id, root, "a.jpg", "a.jpg").await.unwrap();

        let jpeg = find_or_create_content_type(&mut tx, "image/jpeg").await.unwrap();
        assert_eq!(find_or_create_content_type(&mut tx, "image/jpeg").await.unwrap(), jpeg);
        let first = insert_blob(&mut tx, "aaa", 1, Utc::now(), jpeg).await.unwrap();
        let second = insert_blob(&mut tx, "bbb", 2, Utc::now(), jpeg).await.unwrap();

        assert!(link_object_blob(&mut tx, object, first).await.unwrap());
        assert!(!link_object_blob(&mut tx, object, first).await.unwrap());
        assert!(link_object_blob(&mut tx, object, second).await.unwrap());

        let counts = catalog_counts(&mut tx).await.unwrap();
        assert_eq!((counts.blobs, counts.links), (2, 1));

        assert_eq!(prune_disattached_blobs(&mut tx).await.unwrap(), 1);
        assert!(find_blob_by_hash(&mut tx, "aaa").await.unwrap().is_none());
        assert_eq!(find_blob_by_hash(&mut tx, "bbb").await.unwrap().unwrap().id, second);
    }

    #[tokio::test]
    async fn properties_are_replaced_with_a_done_marker() {
        let (_dir, store) = store().await;
        let mut tx = store.begin("catalog").await.unwrap();
        let ct = find_or_create_content_type(&mut tx, "image/jpeg").await.unwrap();
        let blob = insert_blob(&mut tx, "abc", 3, Utc::now(), ct).await.unwrap();

        let first = vec![
            BlobProperty::new("exif", "Make", PropertyValue::Text("SONY".into())),
            BlobProperty::new(
                "exif",
                "ExposureTime",
                PropertyValue::Fraction {
                    numerator: 1,
                    denominator: 250,
                },
            ),
        ];
        replace_properties(&mut tx, blob, "exif", &first).await.unwrap();
        replace_properties(&mut tx, blob, "exif", &first[..1]).await.unwrap();

        let stored = properties_for_blob(&mut tx, blob).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], first[0]);
        assert_eq!(stored[1], BlobProperty::done("exif"));
    }
}
