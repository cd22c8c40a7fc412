//! Postgres-backed [`syncpatch_core::ot::OtServerStore`].

use sqlx::{PgPool, Row};

use syncpatch_core::branch::{Branch, BranchStatus};
use syncpatch_core::ot::OtServerStore;
use syncpatch_core::version::{Version, VersionMetadata, VersionOrigin};
use syncpatch_core::{Change, DocId, Result, Rev};

#[derive(Clone)]
pub struct PgOtServerStore {
    pool: PgPool,
}

impl PgOtServerStore {
    pub fn new(pool: PgPool) -> Self {
        PgOtServerStore { pool }
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

fn origin_to_str(origin: VersionOrigin) -> &'static str {
    match origin {
        VersionOrigin::Main => "main",
        VersionOrigin::Branch => "branch",
        VersionOrigin::Offline => "offline",
    }
}

fn str_to_origin(s: &str) -> VersionOrigin {
    match s {
        "branch" => VersionOrigin::Branch,
        "offline" => VersionOrigin::Offline,
        _ => VersionOrigin::Main,
    }
}

fn status_to_str(status: BranchStatus) -> &'static str {
    match status {
        BranchStatus::Open => "open",
        BranchStatus::Merged => "merged",
        BranchStatus::Closed => "closed",
        BranchStatus::Archived => "archived",
    }
}

fn str_to_status(s: &str) -> BranchStatus {
    match s {
        "merged" => BranchStatus::Merged,
        "closed" => BranchStatus::Closed,
        "archived" => BranchStatus::Archived,
        _ => BranchStatus::Open,
    }
}

impl OtServerStore for PgOtServerStore {
    async fn committed_rev(&self, doc_id: &DocId) -> Result<Rev> {
        let row: (Option<i64>,) = sqlx::query_as(r#"SELECT MAX(rev) FROM ot_changes WHERE doc_id = $1"#)
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

    async fn last_change(&self, doc_id: &DocId) -> Result<Option<Change>> {
        let row = sqlx::query(
            r#"SELECT change_id, ops, rev, base_rev, created_at, committed_at, metadata, batch_id
               FROM ot_changes WHERE doc_id = $1 ORDER BY rev DESC LIMIT 1"#,
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(|r| row_to_change(&r).map_err(map_sqlx)).transpose()
    }

    async fn changes_in_range(&self, doc_id: &DocId, after_rev: Rev, up_to_rev: Option<Rev>) -> Result<Vec<Change>> {
        let rows = sqlx::query(
            r#"SELECT change_id, ops, rev, base_rev, created_at, committed_at, metadata, batch_id
               FROM ot_changes
               WHERE doc_id = $1 AND rev > $2 AND ($3::bigint IS NULL OR rev <= $3)
               ORDER BY rev ASC"#,
        )
        .bind(doc_id)
        .bind(after_rev as i64)
        .bind(up_to_rev.map(|r| r as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(|r| row_to_change(r).map_err(map_sqlx)).collect()
    }

    async fn append_changes(&self, doc_id: &DocId, changes: &[Change]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        for change in changes {
            let ops_json = serde_json::to_value(&change.ops).map_err(|e| syncpatch_core::Error::InvalidPatch(e.to_string()))?;
            let metadata_json = change.metadata.as_ref().map(serde_json::to_value).transpose().ok().flatten();
            sqlx::query(
                r#"INSERT INTO ot_changes (doc_id, rev, change_id, ops, base_rev, created_at, committed_at, metadata, batch_id)
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
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn latest_version(&self, doc_id: &DocId, at_rev: Option<Rev>) -> Result<Option<Version>> {
        let row = sqlx::query(
            r#"SELECT version_id, origin, started_at, ended_at, start_rev, end_rev,
                      group_id, parent_id, branch_name, name, state
               FROM ot_versions
               WHERE doc_id = $1 AND ($2::bigint IS NULL OR end_rev <= $2)
               ORDER BY end_rev DESC LIMIT 1"#,
        )
        .bind(doc_id)
        .bind(at_rev.map(|r| r as i64))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let Some(row) = row else { return Ok(None) };
        let metadata = VersionMetadata {
            id: row.try_get("version_id").map_err(map_sqlx)?,
            origin: str_to_origin(&row.try_get::<String, _>("origin").map_err(map_sqlx)?),
            started_at: row.try_get::<i64, _>("started_at").map_err(map_sqlx)? as u64,
            ended_at: row.try_get::<i64, _>("ended_at").map_err(map_sqlx)? as u64,
            start_rev: row.try_get::<i64, _>("start_rev").map_err(map_sqlx)? as Rev,
            end_rev: row.try_get::<i64, _>("end_rev").map_err(map_sqlx)? as Rev,
            group_id: row.try_get("group_id").map_err(map_sqlx)?,
            parent_id: row.try_get("parent_id").map_err(map_sqlx)?,
            branch_name: row.try_get("branch_name").map_err(map_sqlx)?,
            name: row.try_get("name").map_err(map_sqlx)?,
        };
        let state: serde_json::Value = row.try_get("state").map_err(map_sqlx)?;
        let changes = self.changes_in_range(doc_id, metadata.start_rev, Some(metadata.end_rev)).await?;
        Ok(Some(Version { doc_id: doc_id.clone(), metadata, state, changes }))
    }

    async fn save_version(&self, doc_id: &DocId, version: Version) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO ot_versions
                 (doc_id, version_id, origin, started_at, ended_at, start_rev, end_rev,
                  group_id, parent_id, branch_name, name, state)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(doc_id)
        .bind(&version.metadata.id)
        .bind(origin_to_str(version.metadata.origin))
        .bind(version.metadata.started_at as i64)
        .bind(version.metadata.ended_at as i64)
        .bind(version.metadata.start_rev as i64)
        .bind(version.metadata.end_rev as i64)
        .bind(&version.metadata.group_id)
        .bind(&version.metadata.parent_id)
        .bind(&version.metadata.branch_name)
        .bind(&version.metadata.name)
        .bind(&version.state)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn versions(&self, doc_id: &DocId) -> Result<Vec<Version>> {
        let rows = sqlx::query(
            r#"SELECT version_id, origin, started_at, ended_at, start_rev, end_rev,
                      group_id, parent_id, branch_name, name, state
               FROM ot_versions WHERE doc_id = $1 ORDER BY end_rev ASC"#,
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in &rows {
            let metadata = VersionMetadata {
                id: row.try_get("version_id").map_err(map_sqlx)?,
                origin: str_to_origin(&row.try_get::<String, _>("origin").map_err(map_sqlx)?),
                started_at: row.try_get::<i64, _>("started_at").map_err(map_sqlx)? as u64,
                ended_at: row.try_get::<i64, _>("ended_at").map_err(map_sqlx)? as u64,
                start_rev: row.try_get::<i64, _>("start_rev").map_err(map_sqlx)? as Rev,
                end_rev: row.try_get::<i64, _>("end_rev").map_err(map_sqlx)? as Rev,
                group_id: row.try_get("group_id").map_err(map_sqlx)?,
                parent_id: row.try_get("parent_id").map_err(map_sqlx)?,
                branch_name: row.try_get("branch_name").map_err(map_sqlx)?,
                name: row.try_get("name").map_err(map_sqlx)?,
            };
            let state: serde_json::Value = row.try_get("state").map_err(map_sqlx)?;
            let changes = self.changes_in_range(doc_id, metadata.start_rev, Some(metadata.end_rev)).await?;
            versions.push(Version { doc_id: doc_id.clone(), metadata, state, changes });
        }
        Ok(versions)
    }

    async fn branch(&self, branch_id: &str) -> Result<Option<Branch>> {
        let row = sqlx::query(
            r#"SELECT branch_id, doc_id, branched_at_rev, created_at, status, name, metadata
               FROM branches WHERE branch_id = $1"#,
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(Branch {
            id: row.try_get("branch_id").map_err(map_sqlx)?,
            doc_id: row.try_get("doc_id").map_err(map_sqlx)?,
            branched_at_rev: row.try_get::<i64, _>("branched_at_rev").map_err(map_sqlx)? as Rev,
            created_at: row.try_get::<i64, _>("created_at").map_err(map_sqlx)? as u64,
            status: str_to_status(&row.try_get::<String, _>("status").map_err(map_sqlx)?),
            name: row.try_get("name").map_err(map_sqlx)?,
            metadata: row
                .try_get::<Option<serde_json::Value>, _>("metadata")
                .map_err(map_sqlx)?
                .and_then(|v| serde_json::from_value(v).ok()),
        }))
    }

    async fn save_branch(&self, branch: &Branch) -> Result<()> {
        let metadata_json = branch.metadata.as_ref().map(serde_json::to_value).transpose().ok().flatten();
        sqlx::query(
            r#"INSERT INTO branches (branch_id, doc_id, branched_at_rev, created_at, status, name, metadata)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (branch_id) DO UPDATE SET
                 status = EXCLUDED.status, name = EXCLUDED.name, metadata = EXCLUDED.metadata"#,
        )
        .bind(&branch.id)
        .bind(&branch.doc_id)
        .bind(branch.branched_at_rev as i64)
        .bind(branch.created_at as i64)
        .bind(status_to_str(branch.status))
        .bind(&branch.name)
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}
