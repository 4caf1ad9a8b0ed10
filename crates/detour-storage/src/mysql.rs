use async_trait::async_trait;
use detour_core::error::StorageError;
use detour_core::store::{MappingStore, PutMode, PutOutcome, ReadMappingStore, Result};
use detour_core::{
    Mapping, MappingId, MappingOrigin, MatchKind, NodeId, Redirect, RedirectKind, SourcePath,
};
use jiff::Timestamp;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tracing::{debug, trace};

/// Expands to a `SELECT` over every mapping column followed by `$tail`.
macro_rules! select_mappings {
    ($tail:literal) => {
        concat!(
            "SELECT id, source_path, match_kind, redirect_kind, target_page, target_path, ",
            "target_status, response_code, priority, owner_id, origin, updated_at ",
            "FROM link_mappings ",
            $tail
        )
    };
}

const ORDER_BY: &str = " ORDER BY priority DESC, updated_at DESC, id DESC";

/// MySQL implementation of the mapping store.
///
/// Page mappings carry a `canonical_key` column with a unique index, so two
/// canonical mappings can never be committed together even by writers that
/// bypass this type. Writes run in a transaction that locks the canonical
/// key before checking for conflicts.
#[derive(Debug, Clone)]
pub struct MySqlMappingStore {
    pool: MySqlPool,
}

impl MySqlMappingStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `link_mappings` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(include_str!("../ddl/mysql/link_mappings.sql"))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn fetch(&self, mut query: QueryBuilder<'_, MySql>) -> Result<Vec<Mapping>> {
        query.push(ORDER_BY);
        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(decode_row).collect()
    }
}

/// Column values representing a [`Redirect`]: page, path or link, status.
type RedirectColumns = (Option<u64>, Option<String>, Option<u16>);

fn redirect_columns(redirect: &Redirect) -> RedirectColumns {
    match redirect {
        Redirect::ToPage { page, path } => (Some(page.get()), Some(path.to_string()), None),
        Redirect::ToLink { link } => (None, Some(link.clone()), None),
        Redirect::ToError { status } => (None, None, Some(*status)),
    }
}

fn decode_redirect(kind: &str, columns: RedirectColumns) -> Result<Redirect> {
    let kind: RedirectKind = kind
        .parse()
        .map_err(|e: detour_core::CoreError| StorageError::InvalidData(e.to_string()))?;

    match (kind, columns) {
        (RedirectKind::ToPage, (Some(page), Some(path), _)) => Ok(Redirect::page(
            NodeId::new(page),
            SourcePath::new_unchecked(path),
        )),
        (RedirectKind::ToLink, (_, Some(link), _)) => Ok(Redirect::link(link)),
        (RedirectKind::ToError, (_, _, Some(status))) => Ok(Redirect::error(status)),
        (kind, columns) => Err(StorageError::InvalidData(format!(
            "incomplete {} redirect columns: {:?}",
            kind.as_str(),
            columns
        ))),
    }
}

fn decode_row(row: &MySqlRow) -> Result<Mapping> {
    let id: u64 = row.try_get("id").map_err(map_sqlx_error)?;
    let source: String = row.try_get("source_path").map_err(map_sqlx_error)?;
    let match_kind: String = row.try_get("match_kind").map_err(map_sqlx_error)?;
    let redirect_kind: String = row.try_get("redirect_kind").map_err(map_sqlx_error)?;
    let target_page: Option<u64> = row.try_get("target_page").map_err(map_sqlx_error)?;
    let target_path: Option<String> = row.try_get("target_path").map_err(map_sqlx_error)?;
    let target_status: Option<u16> = row.try_get("target_status").map_err(map_sqlx_error)?;
    let response_code: u16 = row.try_get("response_code").map_err(map_sqlx_error)?;
    let priority: i32 = row.try_get("priority").map_err(map_sqlx_error)?;
    let owner: Option<u64> = row.try_get("owner_id").map_err(map_sqlx_error)?;
    let origin: String = row.try_get("origin").map_err(map_sqlx_error)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(map_sqlx_error)?;

    let invalid = |e: detour_core::CoreError| StorageError::InvalidData(e.to_string());

    Ok(Mapping {
        id: MappingId::new(id),
        source: SourcePath::new_unchecked(source),
        match_kind: match_kind.parse().map_err(invalid)?,
        redirect: decode_redirect(&redirect_kind, (target_page, target_path, target_status))?,
        priority,
        response_code,
        owner: owner.map(NodeId::new),
        origin: origin.parse::<MappingOrigin>().map_err(invalid)?,
        updated_at: Timestamp::from_microsecond(updated_at).map_err(|e| {
            StorageError::InvalidData(format!("invalid updated_at '{}': {e}", updated_at))
        })?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

/// MySQL names the violated index in the message, e.g.
/// `Duplicate entry '7' for key 'link_mappings.PRIMARY'`.
fn names_primary_key(message: &str) -> bool {
    message.contains("PRIMARY'")
}

fn is_deadlock(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == "40001")
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    if is_deadlock(&err) {
        return StorageError::Unavailable(message);
    }

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl ReadMappingStore for MySqlMappingStore {
    async fn get(&self, id: MappingId) -> Result<Option<Mapping>> {
        let row = sqlx::query(select_mappings!("WHERE id = ? LIMIT 1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(decode_row).transpose()
    }

    async fn find_by_source_path(
        &self,
        path: &SourcePath,
        kind: Option<RedirectKind>,
        exclude: &[MappingId],
    ) -> Result<Vec<Mapping>> {
        trace!(path = %path, "Finding mappings by source path");

        let mut query = QueryBuilder::<MySql>::new(select_mappings!("WHERE source_path = "));
        query.push_bind(path.as_str());

        if let Some(kind) = kind {
            query.push(" AND redirect_kind = ").push_bind(kind.as_str());
        }

        if !exclude.is_empty() {
            query.push(" AND id NOT IN (");
            let mut ids = query.separated(", ");
            for id in exclude {
                ids.push_bind(id.get());
            }
            ids.push_unseparated(")");
        }

        self.fetch(query).await
    }

    async fn find_by_match_kind(&self, kind: MatchKind) -> Result<Vec<Mapping>> {
        let mut query = QueryBuilder::<MySql>::new(select_mappings!("WHERE match_kind = "));
        query.push_bind(kind.as_str());
        self.fetch(query).await
    }

    async fn find_by_page(&self, page: NodeId) -> Result<Vec<Mapping>> {
        let mut query = QueryBuilder::<MySql>::new(select_mappings!("WHERE redirect_kind = "));
        query
            .push_bind(RedirectKind::ToPage.as_str())
            .push(" AND target_page = ")
            .push_bind(page.get());
        self.fetch(query).await
    }

    async fn all(&self) -> Result<Vec<Mapping>> {
        self.fetch(QueryBuilder::<MySql>::new(select_mappings!(""))).await
    }
}

impl MySqlMappingStore {
    async fn write(&self, mapping: Mapping, mode: PutMode, insert_only: bool) -> Result<PutOutcome> {
        mapping
            .validate()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        let canonical = mapping.canonical_key().map(|key| key.to_string());
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut replaced = Vec::new();
        if let Some(key) = &canonical {
            let rows = sqlx::query(
                r#"
                SELECT id
                FROM link_mappings
                WHERE canonical_key = ?
                  AND id <> ?
                FOR UPDATE
                "#,
            )
            .bind(key)
            .bind(mapping.id.get())
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            for row in &rows {
                let id: u64 = row.try_get("id").map_err(map_sqlx_error)?;
                replaced.push(MappingId::new(id));
            }

            if let (Some(existing), PutMode::Reject) = (replaced.first(), mode) {
                return Err(StorageError::Conflict {
                    path: mapping.source.to_string(),
                    existing: *existing,
                });
            }

            if !replaced.is_empty() {
                sqlx::query("DELETE FROM link_mappings WHERE canonical_key = ? AND id <> ?")
                    .bind(key)
                    .bind(mapping.id.get())
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
            }
        }

        let existed = sqlx::query("SELECT 1 FROM link_mappings WHERE id = ? FOR UPDATE")
            .bind(mapping.id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .is_some();

        if existed && insert_only {
            return Err(StorageError::DuplicateId(mapping.id));
        }

        let (target_page, target_path, target_status) = redirect_columns(&mapping.redirect);
        let statement = if existed {
            r#"
            UPDATE link_mappings
            SET source_path = ?, match_kind = ?, redirect_kind = ?, target_page = ?,
                target_path = ?, target_status = ?, response_code = ?, priority = ?,
                owner_id = ?, origin = ?, updated_at = ?, canonical_key = ?
            WHERE id = ?
            "#
        } else {
            r#"
            INSERT INTO link_mappings (
                source_path, match_kind, redirect_kind, target_page, target_path,
                target_status, response_code, priority, owner_id, origin, updated_at,
                canonical_key, id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        };

        let result = sqlx::query(statement)
            .bind(mapping.source.as_str())
            .bind(mapping.match_kind.as_str())
            .bind(mapping.redirect.kind().as_str())
            .bind(target_page)
            .bind(target_path)
            .bind(target_status)
            .bind(mapping.response_code)
            .bind(mapping.priority)
            .bind(mapping.owner.map(NodeId::get))
            .bind(mapping.origin.as_str())
            .bind(mapping.updated_at.as_microsecond())
            .bind(canonical.as_deref())
            .bind(mapping.id.get())
            .execute(&mut *tx)
            .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await.map_err(map_sqlx_error)?;
                return Err(self.unique_violation(&mapping, canonical.as_deref(), &err).await);
            }
            Err(err) => return Err(map_sqlx_error(err)),
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(id = %mapping.id, created = !existed, replaced = replaced.len(), "Stored mapping");

        Ok(PutOutcome {
            created: !existed,
            replaced,
        })
    }

    /// Turns a unique index violation raced in by another writer into the
    /// error naming the mapping that won.
    async fn unique_violation(
        &self,
        mapping: &Mapping,
        canonical: Option<&str>,
        err: &sqlx::Error,
    ) -> StorageError {
        let message = err
            .as_database_error()
            .map(|e| e.message().to_string())
            .unwrap_or_default();
        if names_primary_key(&message) {
            return StorageError::DuplicateId(mapping.id);
        }

        let Some(key) = canonical else {
            return StorageError::Query(message);
        };

        let winner = sqlx::query(
            "SELECT id FROM link_mappings WHERE canonical_key = ? AND id <> ? LIMIT 1",
        )
        .bind(key)
        .bind(mapping.id.get())
        .fetch_optional(&self.pool)
        .await;

        match winner {
            Ok(Some(row)) => match row.try_get::<u64, _>("id") {
                Ok(existing) => StorageError::Conflict {
                    path: mapping.source.to_string(),
                    existing: MappingId::new(existing),
                },
                Err(err) => map_sqlx_error(err),
            },
            Ok(None) => StorageError::Unavailable(format!(
                "canonical mapping for '{}' changed during the write",
                mapping.source
            )),
            Err(err) => map_sqlx_error(err),
        }
    }
}

#[async_trait]
impl MappingStore for MySqlMappingStore {
    async fn put(&self, mapping: Mapping, mode: PutMode) -> Result<PutOutcome> {
        self.write(mapping, mode, false).await
    }

    async fn insert(&self, mapping: Mapping, mode: PutMode) -> Result<PutOutcome> {
        self.write(mapping, mode, true).await
    }

    async fn remove(&self, id: MappingId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM link_mappings WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
