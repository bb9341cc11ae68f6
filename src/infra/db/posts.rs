use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::application::pagination::PageRequest;
use crate::application::repos::{PostScope, PostsRepo, PostsWriteRepo, RepoError};
use crate::domain::entities::{AuthorSummary, GroupSummary, PostRecord, PostView};
use crate::domain::forms::{CreatePostInput, EditPostInput};

use super::{PostgresRepositories, map_sqlx_error};

const POST_VIEW_SELECT: &str = "SELECT p.id, p.text, p.pub_date, p.image, \
     u.id AS author_id, u.username AS author_username, u.display_name AS author_display_name, \
     g.id AS group_id, g.title AS group_title, g.slug AS group_slug \
     FROM posts p \
     INNER JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id \
     WHERE 1=1 ";

const POST_RETURNING: &str = "RETURNING id, text, pub_date, author_id, group_id, image";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            pub_date: row.pub_date,
            author_id: row.author_id,
            group_id: row.group_id,
            image: row.image,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostViewRow {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    image: Option<String>,
    author_id: i64,
    author_username: String,
    author_display_name: String,
    group_id: Option<i64>,
    group_title: Option<String>,
    group_slug: Option<String>,
}

impl From<PostViewRow> for PostView {
    fn from(row: PostViewRow) -> Self {
        let group = match (row.group_id, row.group_title, row.group_slug) {
            (Some(id), Some(title), Some(slug)) => Some(GroupSummary { id, title, slug }),
            _ => None,
        };

        Self {
            id: row.id,
            text: row.text,
            pub_date: row.pub_date,
            author: AuthorSummary {
                id: row.author_id,
                username: row.author_username,
                display_name: row.author_display_name,
            },
            group,
            image: row.image,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_post_scope(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        page: PageRequest,
    ) -> Result<Vec<PostView>, RepoError> {
        let offset = i64::try_from(page.offset)
            .map_err(|_| RepoError::InvalidInput {
                message: "page offset exceeds supported range".to_string(),
            })?;

        let mut qb = QueryBuilder::new(POST_VIEW_SELECT);
        Self::apply_post_scope(&mut qb, scope);
        qb.push(" ORDER BY p.pub_date DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<PostViewRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostView::from).collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostView>, RepoError> {
        let mut qb = QueryBuilder::new(POST_VIEW_SELECT);
        qb.push(" AND p.id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<PostViewRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostView::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, input: CreatePostInput) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "INSERT INTO posts (text, author_id, group_id, image) VALUES ($1, $2, $3, $4) \
             {POST_RETURNING}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(&input.text)
            .bind(input.author_id)
            .bind(input.group_id)
            .bind(input.image.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, input: EditPostInput) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "UPDATE posts SET text = $1, group_id = $2, image = COALESCE($3, image) \
             WHERE id = $4 {POST_RETURNING}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(&input.text)
            .bind(input.group_id)
            .bind(input.image.as_deref())
            .bind(input.post_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }
}
