use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::info;

use crate::application::auth::CurrentUser;
use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    CommentsRepo, GroupsRepo, PostScope, PostsRepo, PostsWriteRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{AuthorSummary, CommentView, GroupRecord, PostRecord, PostView};
use crate::domain::forms::{
    AddCommentInput, CommentForm, CreatePostInput, EditPostInput, FieldErrors, ImageMeta,
    PostContent, PostForm, validate_comment, validate_post,
};

#[derive(Debug, Error)]
pub enum PostServiceError {
    #[error("group `{0}` not found")]
    UnknownGroup(String),
    #[error("user `{0}` not found")]
    UnknownAuthor(String),
    #[error("post {0} not found")]
    UnknownPost(i64),
    #[error("post {post_id} may only be edited by its author")]
    NotAuthor { post_id: i64 },
    #[error("submitted form is invalid")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct GroupListing {
    pub group: GroupRecord,
    pub page: Page<PostView>,
}

pub struct ProfileListing {
    pub author: AuthorSummary,
    pub post_count: u64,
    pub page: Page<PostView>,
}

pub struct PostDetail {
    pub post: PostView,
    pub comments: Vec<CommentView>,
    pub author_post_count: u64,
    pub can_edit: bool,
}

#[derive(Clone)]
pub struct PostService {
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    comments: Arc<dyn CommentsRepo>,
    paginator: Paginator,
}

impl PostService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        groups: Arc<dyn GroupsRepo>,
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        comments: Arc<dyn CommentsRepo>,
        paginator: Paginator,
    ) -> Self {
        Self {
            users,
            groups,
            posts,
            writer,
            comments,
            paginator,
        }
    }

    async fn paginate(
        &self,
        scope: PostScope,
        raw_page: Option<&str>,
    ) -> Result<Page<PostView>, PostServiceError> {
        let total = self.posts.count_posts(scope).await?;
        let window = self.paginator.window(total, raw_page);
        let items = self.posts.list_posts(scope, window.request()).await?;
        Ok(Page::new(items, window))
    }

    pub async fn index(&self, raw_page: Option<&str>) -> Result<Page<PostView>, PostServiceError> {
        self.paginate(PostScope::All, raw_page).await
    }

    pub async fn group_posts(
        &self,
        slug: &str,
        raw_page: Option<&str>,
    ) -> Result<GroupListing, PostServiceError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| PostServiceError::UnknownGroup(slug.to_string()))?;

        let page = self.paginate(PostScope::Group(group.id), raw_page).await?;
        Ok(GroupListing { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        raw_page: Option<&str>,
    ) -> Result<ProfileListing, PostServiceError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| PostServiceError::UnknownAuthor(username.to_string()))?;

        let page = self
            .paginate(PostScope::Author(author.id), raw_page)
            .await?;

        Ok(ProfileListing {
            author: author.summary(),
            post_count: page.total_count,
            page,
        })
    }

    pub async fn post_detail(
        &self,
        post_id: i64,
        viewer: Option<&CurrentUser>,
    ) -> Result<PostDetail, PostServiceError> {
        let post = self.find_post(post_id).await?;
        let comments = self.comments.list_for_post(post.id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostScope::Author(post.author.id))
            .await?;
        let can_edit = viewer.is_some_and(|viewer| post.is_authored_by(viewer.id));

        Ok(PostDetail {
            post,
            comments,
            author_post_count,
            can_edit,
        })
    }

    /// Groups offered as choices by the post form.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostServiceError> {
        Ok(self.groups.list_groups().await?)
    }

    /// Validate a submitted post form; nothing is persisted.
    pub async fn check_post_form(
        &self,
        form: &PostForm,
        image: Option<&ImageMeta>,
    ) -> Result<PostContent, PostServiceError> {
        let choices = self.group_choices().await?;
        validate_post(form, image, &choices).map_err(PostServiceError::Invalid)
    }

    pub async fn create_post(
        &self,
        author: &CurrentUser,
        content: PostContent,
        image: Option<String>,
    ) -> Result<PostRecord, PostServiceError> {
        let record = self
            .writer
            .create_post(CreatePostInput {
                author_id: author.id,
                text: content.text,
                group_id: content.group_id,
                image,
            })
            .await?;

        counter!("yatube_posts_created_total").increment(1);
        info!(
            target = "yatube::application::posts",
            post_id = record.id,
            author_id = author.id,
            "post created"
        );
        Ok(record)
    }

    /// Fetch a post for editing, refusing anyone but its author.
    pub async fn editable_post(
        &self,
        post_id: i64,
        editor: &CurrentUser,
    ) -> Result<PostView, PostServiceError> {
        let post = self.find_post(post_id).await?;
        if !post.is_authored_by(editor.id) {
            return Err(PostServiceError::NotAuthor { post_id });
        }
        Ok(post)
    }

    pub async fn edit_post(
        &self,
        editor: &CurrentUser,
        post_id: i64,
        content: PostContent,
        image: Option<String>,
    ) -> Result<PostRecord, PostServiceError> {
        self.editable_post(post_id, editor).await?;

        let record = self
            .writer
            .update_post(EditPostInput {
                post_id,
                text: content.text,
                group_id: content.group_id,
                image,
            })
            .await
            .map_err(|err| match err {
                RepoError::NotFound => PostServiceError::UnknownPost(post_id),
                other => PostServiceError::Repo(other),
            })?;

        info!(
            target = "yatube::application::posts",
            post_id,
            editor_id = editor.id,
            "post updated"
        );
        Ok(record)
    }

    /// Attach a comment to an existing post.
    ///
    /// Returns `Ok(None)` when the form is invalid; nothing is stored in that case.
    pub async fn add_comment(
        &self,
        author: &CurrentUser,
        post_id: i64,
        form: &CommentForm,
    ) -> Result<Option<CommentView>, PostServiceError> {
        let post = self.find_post(post_id).await?;

        let Ok(text) = validate_comment(form) else {
            return Ok(None);
        };

        let comment = self
            .comments
            .create_comment(AddCommentInput {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;

        counter!("yatube_comments_created_total").increment(1);
        Ok(Some(comment))
    }

    async fn find_post(&self, post_id: i64) -> Result<PostView, PostServiceError> {
        self.posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostServiceError::UnknownPost(post_id))
    }
}
