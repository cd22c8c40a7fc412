//! Postgres-backed [`syncpatch_core::lww::LwwServerStore`].

use std::collections::HashMap;

use sqlx::{PgPool, Row};

use syncpatch_core::patch::JsonPatchOp;
use syncpatch_core::{Change, DocId, Path, Result, Rev};

use syncpatch_core::lww::LwwServerStore;

#[derive(Clone)]
pub struct PgLwwServerStore {
    pool: PgPool,
}

impl PgLwwServerStore {
    pub fn new(pool: PgPool) -> Self {
        PgLwwServerStore { pool }
    }
}

fn map_sqlx(e: sqlx::Error) -> syncpatch_core::Error {
    syncpatch_core::Error::StoreUnavailable(e.to_string())
}

fn row_to_change(row: &sqlx::postgres::PgRow) -> sqlx::Result<Change> {
    let ops_json: serde_json::Value = row.try_get("ops")?;
    let ops = serde_json::from_value(ops_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(Change {
        id: row.try_get("change_id")?,
        ops,
        rev: row.try_get::<i64, _>("rev")? as Rev,
        base_rev: row.try_get::<i64, _>("base_rev")? as Rev,
        created_at: row.try_get::<i64, _>("created_at")? as u64,
        committed_at: row.try_get::<i64, _>("committed_at")? as u64,
        metadata: row
            .try_get::<Option<serde_json::Value>, _>("metadata")?
            .and_then(|v| serde_json::from_value(v).ok()),
        batch_id: row.try_get("batch_id")?,
    })
}

impl LwwServerStore for PgLwwServerStore {
    async fn committed_rev(&self, doc_id: &DocId) -> Result<Rev> {
        let row: (Option<i64>,) = sqlx::query_as(r#"SELECT MAX(rev) FROM lww_history WHERE doc_id = $1"#)
            .bind(doc_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.0.unwrap_or(0) as Rev)
    }

    async fn is_deleted(&self, doc_id: &DocId) -> Result<bool> {
        let row: Option<(bool,)> = sqlx::query_as(r#"SELECT deleted FROM docs WHERE doc_id = $1"#)
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(|r| r.0).unwrap_or(false))
    }

    async fn set_deleted(&self, doc_id: &DocId, deleted: bool) -> Result<()> {
        sqlx::query(r#"UPDATE docs SET deleted = $2 WHERE doc_id = $1"#)
            .bind(doc_id)
            .bind(deleted)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn committed_fields(&self, doc_id: &DocId) -> Result<HashMap<Path, JsonPatchOp>> {
        let rows = sqlx::query(r#"SELECT path, op FROM lww_fields WHERE doc_id = $1"#)
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let path: Path = row.try_get("path").map_err(map_sqlx)?;
            let op_json: serde_json::Value = row.try_get("op").map_err(map_sqlx)?;
            let op: JsonPatchOp = serde_json::from_value(op_json).map_err(|e| syncpatch_core::Error::InvalidPatch(e.to_string()))?;
            out.insert(path, op);
        }
        Ok(out)
    }

    async fn set_committed_field(&self, doc_id: &DocId, path: Path, op: JsonPatchOp) -> Result<()> {
        let op_json = serde_json::to_value(&op).map_err(|e| syncpatch_core::Error::InvalidPatch(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO lww_fields (doc_id, path, op) VALUES ($1, $2, $3)
               ON CONFLICT (doc_id, path) DO UPDATE SET op = EXCLUDED.op"#,
        )
        .bind(doc_id)
        .bind(&path)
        .bind(op_json)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if op.op == syncpatch_core::patch::OpType::Txt {
            if let Some(delta) = &op.value {
                let rev = self.committed_rev(doc_id).await? + 1;
                sqlx::query(r#"INSERT INTO lww_text_deltas (doc_id, path, rev, delta) VALUES ($1, $2, $3, $4)"#)
                    .bind(doc_id)
                    .bind(&path)
                    .bind(rev as i64)
                    .bind(delta)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx)?;
            }
        }
        Ok(())
    }

    async fn remove_committed_field(&self, doc_id: &DocId, path: &Path) -> Result<()> {
        sqlx::query(r#"DELETE FROM lww_fields WHERE doc_id = $1 AND path = $2"#)
            .bind(doc_id)
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn append_history(&self, doc_id: &DocId, change: Change) -> Result<()> {
        let ops_json = serde_json::to_value(&change.ops).map_err(|e| syncpatch_core::Error::InvalidPatch(e.to_string()))?;
        let metadata_json = change.metadata.as_ref().map(serde_json::to_value).transpose().ok().flatten();
        sqlx::query(
            r#"INSERT INTO lww_history (doc_id, rev, change_id, ops, base_rev, created_at, committed_at, metadata, batch_id)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(doc_id)
        .bind(change.rev as i64)
        .bind(&change.id)
        .bind(ops_json)
        .bind(change.base_rev as i64)
        .bind(change.created_at as i64)
        .bind(change.committed_at as i64)
        .bind(metadata_json)
        .bind(&change.batch_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn history_since(&self, doc_id: &DocId, rev: Rev) -> Result<Vec<Change>> {
        let rows = sqlx::query(
            r#"SELECT change_id, ops, rev, base_rev, created_at, committed_at, metadata, batch_id
               FROM lww_history WHERE doc_id = $1 AND rev > $2 ORDER BY rev ASC"#,
        )
        .bind(doc_id)
        .bind(rev as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(|r| row_to_change(r).map_err(map_sqlx)).collect()
    }

    async fn snapshot(&self, doc_id: &DocId) -> Result<Option<(serde_json::Value, Rev)>> {
        let row: Option<(serde_json::Value, i64)> = sqlx::query_as(r#"SELECT state, rev FROM lww_snapshots WHERE doc_id = $1"#)
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(|(state, rev)| (state, rev as Rev)))
    }

    async fn save_snapshot(&self, doc_id: &DocId, state: serde_json::Value, rev: Rev) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO lww_snapshots (doc_id, state, rev) VALUES ($1, $2, $3)
               ON CONFLICT (doc_id) DO UPDATE SET state = EXCLUDED.state, rev = EXCLUDED.rev"#,
        )
        .bind(doc_id)
        .bind(&state)
        .bind(rev as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

/// All text-delta entries for `doc_id` committed after `rev`, grouped by
/// path and paired with the rev they were committed at — used by
/// `getChangesSince` to substitute the composed delta for a `@txt`
/// field instead of its folded value.
pub async fn text_deltas_since(pool: &PgPool, doc_id: &DocId, rev: Rev) -> Result<HashMap<Path, Vec<(Rev, serde_json::Value)>>> {
    let rows = sqlx::query(r#"SELECT path, rev, delta FROM lww_text_deltas WHERE doc_id = $1 AND rev > $2 ORDER BY rev ASC"#)
        .bind(doc_id)
        .bind(rev as i64)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx)?;
    let mut out: HashMap<Path, Vec<(Rev, serde_json::Value)>> = HashMap::new();
    for row in rows {
        let path: Path = row.try_get("path").map_err(map_sqlx)?;
        let rev: i64 = row.try_get("rev").map_err(map_sqlx)?;
        let delta: serde_json::Value = row.try_get("delta").map_err(map_sqlx)?;
        out.entry(path).or_default().push((rev as Rev, delta));
    }
    Ok(out)
}
