//! The `docs` registry: which algorithm (OT or LWW) each document uses,
//! decided once at creation, plus the deleted flag that gates
//! recreation of a deleted doc under the same id.

use sqlx::{PgPool, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Ot,
    Lww,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Ot => "ot",
            Algorithm::Lww => "lww",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = sqlx::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ot" => Ok(Algorithm::Ot),
            "lww" => Ok(Algorithm::Lww),
            other => Err(sqlx::Error::Decode(format!("unknown algorithm: {other}").into())),
        }
    }
}

/// Look up a doc's algorithm and deleted flag, if the doc is registered.
pub async fn get_doc(pool: &PgPool, doc_id: &str) -> Result<Option<(Algorithm, bool)>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT algorithm, deleted FROM docs WHERE doc_id = $1"#)
        .bind(doc_id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let algorithm: String = row.try_get("algorithm")?;
            let deleted: bool = row.try_get("deleted")?;
            Ok(Some((algorithm.parse().unwrap_or(Algorithm::Ot), deleted)))
        }
        None => Ok(None),
    }
}

/// Register a new doc under its chosen algorithm. A no-op if the doc is
/// already registered (the first committer wins the algorithm choice).
pub async fn ensure_doc(pool: &PgPool, doc_id: &str, algorithm: Algorithm, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO docs (doc_id, algorithm, deleted, created_at)
        VALUES ($1, $2, FALSE, $3)
        ON CONFLICT (doc_id) DO NOTHING
        "#,
    )
    .bind(doc_id)
    .bind(algorithm.as_str())
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_deleted(pool: &PgPool, doc_id: &str, deleted: bool) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE docs SET deleted = $2 WHERE doc_id = $1"#)
        .bind(doc_id)
        .bind(deleted)
        .execute(pool)
        .await?;
    Ok(())
}
