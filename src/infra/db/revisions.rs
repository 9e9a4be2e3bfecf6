use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{InsertRevisionParams, RepoError, RevisionsRepo};
use crate::domain::revisions::{ConfigRevisionRecord, Namespace};

use super::{PostgresRepositories, map_sqlx_error};

/// `seq` is a `BIGSERIAL`: it carries the physical insertion order the
/// "most recent" lookup relies on. Timestamps are informational only.
#[derive(Debug, sqlx::FromRow)]
struct RevisionRow {
    id: Uuid,
    username: String,
    application: String,
    body: serde_json::Value,
    previous: Option<Uuid>,
    created_at: OffsetDateTime,
}

impl From<RevisionRow> for ConfigRevisionRecord {
    fn from(row: RevisionRow) -> Self {
        ConfigRevisionRecord {
            id: row.id,
            namespace: Namespace::new(row.username, row.application),
            body: row.body,
            previous: row.previous,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
impl RevisionsRepo for PostgresRepositories {
    async fn insert_revision(
        &self,
        params: InsertRevisionParams,
    ) -> Result<ConfigRevisionRecord, RepoError> {
        let row = sqlx::query_as::<_, RevisionRow>(
            r"
            INSERT INTO config_revisions (id, username, application, body, previous, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, application, body, previous, created_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(&params.namespace.username)
        .bind(&params.namespace.application)
        .bind(&params.body)
        .bind(params.previous)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_latest(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<ConfigRevisionRecord>, RepoError> {
        let row = sqlx::query_as::<_, RevisionRow>(
            r"
            SELECT id, username, application, body, previous, created_at
            FROM config_revisions
            WHERE username = $1 AND application = $2
            ORDER BY seq DESC
            LIMIT 1
            ",
        )
        .bind(&namespace.username)
        .bind(&namespace.application)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn drop_namespace(&self, namespace: &Namespace) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r"
            DELETE FROM config_revisions
            WHERE username = $1 AND application = $2
            ",
        )
        .bind(&namespace.username)
        .bind(&namespace.application)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
