use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreateSessionParams, RepoError, SessionsRepo};
use crate::domain::entities::SessionRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SessionRow {
    selector: String,
    secret_hash: Vec<u8>,
    user_id: i64,
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            selector: row.selector,
            secret_hash: row.secret_hash,
            user_id: row.user_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn create_session(&self, params: CreateSessionParams) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO sessions (selector, secret_hash, user_id, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&params.selector)
        .bind(&params.secret_hash)
        .bind(params.user_id)
        .bind(params.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_session(&self, selector: &str) -> Result<Option<SessionRecord>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT selector, secret_hash, user_id, created_at, expires_at \
             FROM sessions WHERE selector = $1",
        )
        .bind(selector)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SessionRecord::from))
    }

    async fn delete_session(&self, selector: &str) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM sessions WHERE selector = $1")
            .bind(selector)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
