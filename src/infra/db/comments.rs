use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CommentsRepo, RepoError};
use crate::domain::entities::{AuthorSummary, CommentView};
use crate::domain::forms::AddCommentInput;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    text: String,
    created: OffsetDateTime,
    author_id: i64,
    author_username: String,
    author_display_name: String,
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author: AuthorSummary {
                id: row.author_id,
                username: row.author_username,
                display_name: row.author_display_name,
            },
            text: row.text,
            created: row.created,
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentView>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT c.id, c.post_id, c.text, c.created, \
             u.id AS author_id, u.username AS author_username, \
             u.display_name AS author_display_name \
             FROM comments c INNER JOIN users u ON u.id = c.author_id \
             WHERE c.post_id = $1 ORDER BY c.created, c.id",
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentView::from).collect())
    }

    async fn create_comment(&self, input: AddCommentInput) -> Result<CommentView, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "WITH inserted AS ( \
                 INSERT INTO comments (post_id, author_id, text) VALUES ($1, $2, $3) \
                 RETURNING id, post_id, author_id, text, created \
             ) \
             SELECT c.id, c.post_id, c.text, c.created, \
             u.id AS author_id, u.username AS author_username, \
             u.display_name AS author_display_name \
             FROM inserted c INNER JOIN users u ON u.id = c.author_id",
        )
        .bind(input.post_id)
        .bind(input.author_id)
        .bind(&input.text)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
