//! In-memory repositories and request helpers shared by the router tests.

#![allow(dead_code)]

use std::{
    num::NonZeroU32,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{
        Request, Response, StatusCode,
        header::{CONTENT_TYPE, COOKIE, LOCATION},
    },
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

use yatube::{
    application::{
        auth::{AuthService, hash_password},
        pagination::{PageRequest, Paginator},
        posts::PostService,
        repos::{
            CommentsRepo, CreateGroupParams, CreateSessionParams, CreateUserParams, GroupsRepo,
            HealthRepo, PostScope, PostsRepo, PostsWriteRepo, RepoError, SessionsRepo, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheState, INDEX_KEY_PREFIX},
    config::{AuthSettings, PaginationSettings},
    domain::{
        entities::{
            CommentView, GroupRecord, GroupSummary, PostRecord, PostView, SessionRecord,
            UserRecord,
        },
        forms::{AddCommentInput, CreatePostInput, EditPostInput},
    },
    infra::{
        http::{HttpState, build_router},
        uploads::UploadStorage,
    },
};

pub const PASSWORD: &str = "test-password";
pub const LOGIN_PATH: &str = "/auth/login/";

/// A 1x1 transparent GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

fn shared_password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).expect("hash test password"))
        .clone()
}

fn base_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp")
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created: OffsetDateTime,
}

#[derive(Default)]
struct Inner {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<StoredComment>,
    sessions: Vec<SessionRecord>,
    next_id: i64,
    healthy: bool,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn author(&self, id: i64) -> Result<yatube::domain::entities::AuthorSummary, RepoError> {
        self.users
            .iter()
            .find(|user| user.id == id)
            .map(UserRecord::summary)
            .ok_or_else(|| RepoError::Integrity {
                message: format!("unknown user {id}"),
            })
    }

    fn view(&self, post: &PostRecord) -> Result<PostView, RepoError> {
        Ok(PostView {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            author: self.author(post.author_id)?,
            group: post.group_id.and_then(|group_id| {
                self.groups
                    .iter()
                    .find(|group| group.id == group_id)
                    .map(GroupSummary::from)
            }),
            image: post.image.clone(),
        })
    }

    fn scoped(&self, scope: PostScope) -> Vec<&PostRecord> {
        let mut posts: Vec<&PostRecord> = self
            .posts
            .iter()
            .filter(|post| match scope {
                PostScope::All => true,
                PostScope::Group(id) => post.group_id == Some(id),
                PostScope::Author(id) => post.author_id == id,
            })
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

/// Every repository trait backed by one mutex-guarded set of vectors.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                healthy: true,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("store lock")
    }

    pub fn seed_user(&self, username: &str) -> UserRecord {
        let mut inner = self.lock();
        let user = UserRecord {
            id: inner.next_id(),
            username: username.to_string(),
            display_name: String::new(),
            password_hash: shared_password_hash(),
            created_at: base_time(),
        };
        inner.users.push(user.clone());
        user
    }

    pub fn seed_group(&self, title: &str, slug: &str) -> GroupRecord {
        let mut inner = self.lock();
        let group = GroupRecord {
            id: inner.next_id(),
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        };
        inner.groups.push(group.clone());
        group
    }

    /// Each seeded post is one minute newer than the previous one.
    pub fn seed_post(
        &self,
        author: &UserRecord,
        group: Option<&GroupRecord>,
        text: &str,
    ) -> PostRecord {
        let mut inner = self.lock();
        let id = inner.next_id();
        let post = PostRecord {
            id,
            text: text.to_string(),
            pub_date: base_time() + time::Duration::minutes(id),
            author_id: author.id,
            group_id: group.map(|group| group.id),
            image: None,
        };
        inner.posts.push(post.clone());
        post
    }

    pub fn post(&self, id: i64) -> Option<PostRecord> {
        self.lock().posts.iter().find(|post| post.id == id).cloned()
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn comment_texts(&self, post_id: i64) -> Vec<String> {
        self.lock()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| comment.text.clone())
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock().users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut inner = self.lock();
        if inner.users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: inner.next_id(),
            username: params.username,
            display_name: params.display_name,
            password_hash: params.password_hash,
            created_at: base_time(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.lock().groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .lock()
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut inner = self.lock();
        let group = GroupRecord {
            id: inner.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        inner.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        Ok(self.lock().scoped(scope).len() as u64)
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        page: PageRequest,
    ) -> Result<Vec<PostView>, RepoError> {
        let inner = self.lock();
        inner
            .scoped(scope)
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|post| inner.view(post))
            .collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostView>, RepoError> {
        let inner = self.lock();
        inner
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| inner.view(post))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, input: CreatePostInput) -> Result<PostRecord, RepoError> {
        let mut inner = self.lock();
        let id = inner.next_id();
        let post = PostRecord {
            id,
            text: input.text,
            pub_date: base_time() + time::Duration::minutes(id),
            author_id: input.author_id,
            group_id: input.group_id,
            image: input.image,
        };
        inner.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, input: EditPostInput) -> Result<PostRecord, RepoError> {
        let mut inner = self.lock();
        let post = inner
            .posts
            .iter_mut()
            .find(|post| post.id == input.post_id)
            .ok_or(RepoError::NotFound)?;
        post.text = input.text;
        post.group_id = input.group_id;
        if input.image.is_some() {
            post.image = input.image;
        }
        Ok(post.clone())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentView>, RepoError> {
        let inner = self.lock();
        inner
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| {
                Ok(CommentView {
                    id: comment.id,
                    post_id: comment.post_id,
                    author: inner.author(comment.author_id)?,
                    text: comment.text.clone(),
                    created: comment.created,
                })
            })
            .collect()
    }

    async fn create_comment(&self, input: AddCommentInput) -> Result<CommentView, RepoError> {
        let mut inner = self.lock();
        let id = inner.next_id();
        let comment = StoredComment {
            id,
            post_id: input.post_id,
            author_id: input.author_id,
            text: input.text,
            created: base_time() + time::Duration::minutes(id),
        };
        inner.comments.push(comment.clone());
        Ok(CommentView {
            id,
            post_id: comment.post_id,
            author: inner.author(comment.author_id)?,
            text: comment.text,
            created: comment.created,
        })
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(&self, params: CreateSessionParams) -> Result<(), RepoError> {
        self.lock().sessions.push(SessionRecord {
            selector: params.selector,
            secret_hash: params.secret_hash,
            user_id: params.user_id,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        });
        Ok(())
    }

    async fn find_session(&self, selector: &str) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|session| session.selector == selector)
            .cloned())
    }

    async fn delete_session(&self, selector: &str) -> Result<(), RepoError> {
        self.lock()
            .sessions
            .retain(|session| session.selector != selector);
        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|session| !session.is_expired(now));
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.lock().healthy {
            Ok(())
        } else {
            Err(RepoError::Timeout)
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub state: HttpState,
    pub media: TempDir,
}

pub struct AppOptions {
    pub count_on_page: u32,
    pub cache: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            count_on_page: 10,
            cache: false,
        }
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(AppOptions::default())
    }

    pub fn with_options(options: AppOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        let media = tempfile::tempdir().expect("media dir");

        let pagination = PaginationSettings {
            count_on_page: NonZeroU32::new(options.count_on_page).expect("page size"),
        };
        let posts = Arc::new(PostService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Paginator::new(pagination),
        ));
        let auth = Arc::new(AuthService::new(
            store.clone(),
            store.clone(),
            Duration::from_secs(3600),
        ));

        let state = HttpState {
            posts,
            auth,
            health: store.clone(),
            uploads: Arc::new(UploadStorage::new(media.path().to_path_buf()).expect("storage")),
            cache: options
                .cache
                .then(|| CacheState::new(CacheConfig::default(), INDEX_KEY_PREFIX)),
            auth_settings: AuthSettings {
                session_ttl: Duration::from_secs(3600),
                login_path: LOGIN_PATH.to_string(),
                secure_cookies: false,
            },
            max_request_bytes: 5 * 1024 * 1024,
        };

        Self {
            router: build_router(state.clone()),
            store,
            state,
            media,
        }
    }

    /// Open a session for `user` and return the matching `Cookie` header value.
    pub async fn sign_in(&self, user: &UserRecord) -> String {
        let (_, session) = self
            .state
            .auth
            .login(&user.username, PASSWORD, OffsetDateTime::now_utc())
            .await
            .expect("login");
        format!("sessionid={}", session.token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).expect("request")).await
    }

    pub async fn post_urlencoded(
        &self,
        uri: &str,
        cookie: Option<&str>,
        body: &str,
    ) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        self.send(request.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        cookie: Option<&str>,
        form: MultipartForm,
    ) -> Response<Body> {
        let (content_type, body) = form.finish();
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, content_type);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        self.send(request.body(Body::from(body)).expect("request"))
            .await
    }
}

const BOUNDARY: &str = "yatube-test-boundary";

/// Hand-assembled `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), self.body)
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
}

/// Number of rendered post cards in a listing page.
pub fn card_count(html: &str) -> usize {
    html.matches("class=\"post-card\"").count()
}

pub fn assert_redirect(response: &Response<Body>, expected: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), expected);
}
