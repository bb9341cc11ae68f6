use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{auth::CurrentUser, error::HttpError, posts::PostServiceError},
    infra::uploads::UploadStorageError,
    presentation::views::{
        AuthorView, CommentCard, CommentFormView, GroupListContext, GroupListTemplate, GroupView,
        IndexContext, IndexTemplate, LayoutChrome, LayoutContext, ListingContext, PostCard,
        PostDetailContext, PostDetailTemplate, ProfileContext, ProfileTemplate,
        render_not_found_response, render_template_response,
    },
};

use super::{HttpState, Viewer, db_health_response, repo_error_to_http};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    page: Option<String>,
}

pub(super) async fn index(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new("Latest posts", viewer.as_ref());
    match state.posts.index(query.page.as_deref()).await {
        Ok(page) => {
            let content = IndexContext {
                listing: ListingContext::from(&page),
            };
            let view = LayoutContext::new(chrome, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

pub(super) async fn group_posts(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.posts.group_posts(&slug, query.page.as_deref()).await {
        Ok(listing) => {
            let chrome = LayoutChrome::new(listing.group.title.clone(), viewer.as_ref());
            let content = GroupListContext {
                group: GroupView::from(&listing.group),
                listing: ListingContext::from(&listing.page),
            };
            let view = LayoutContext::new(chrome, content);
            render_template_response(GroupListTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_to_response(err, not_found_chrome(viewer.as_ref())),
    }
}

pub(super) async fn profile(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.posts.profile(&username, query.page.as_deref()).await {
        Ok(listing) => {
            let author = AuthorView::from(&listing.author);
            let chrome = LayoutChrome::new(
                format!("Profile of {}", author.name),
                viewer.as_ref(),
            );
            let content = ProfileContext {
                author,
                post_count: listing.post_count,
                listing: ListingContext::from(&listing.page),
            };
            let view = LayoutContext::new(chrome, content);
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_to_response(err, not_found_chrome(viewer.as_ref())),
    }
}

pub(super) async fn post_detail(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(
            not_found_chrome(viewer.as_ref()),
            format!("`{raw_id}` is not a post id"),
        );
    };

    match state.posts.post_detail(post_id, viewer.as_ref()).await {
        Ok(detail) => {
            let post = PostCard::from(&detail.post);
            let title = post.text.chars().take(30).collect::<String>();
            let content = PostDetailContext {
                edit_url: format!("/posts/{post_id}/edit/"),
                comment_form: CommentFormView::unbound(post_id),
                comments: detail.comments.iter().map(CommentCard::from).collect(),
                author_post_count: detail.author_post_count,
                can_edit: detail.can_edit,
                is_authenticated: viewer.is_some(),
                login_url: super::middleware::login_redirect(
                    &state.auth_settings.login_path,
                    &post.detail_url,
                ),
                post,
            };
            let view = LayoutContext::new(LayoutChrome::new(title, viewer.as_ref()), content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_to_response(err, not_found_chrome(viewer.as_ref())),
    }
}

pub(super) async fn serve_media(
    State(state): State<HttpState>,
    Path(path): Path<String>,
) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.uploads.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

pub(super) async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

pub(super) async fn not_found(Viewer(viewer): Viewer, request: Request) -> Response {
    render_not_found_response(
        not_found_chrome(viewer.as_ref()),
        format!("no route for `{}`", request.uri().path()),
    )
}

/// Content types media may be served as; anything else goes out as opaque bytes.
const MEDIA_TYPES: [&str; 4] = ["image/gif", "image/png", "image/jpeg", "image/webp"];

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = MEDIA_TYPES
        .into_iter()
        .find(|allowed| *allowed == mime.essence_str())
        .unwrap_or("application/octet-stream");
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

pub(super) fn not_found_chrome(viewer: Option<&CurrentUser>) -> LayoutChrome {
    LayoutChrome::new("Page not found", viewer)
}

pub(super) fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Unknown groups, users and posts render the 404 page; everything else is an [`HttpError`].
pub(super) fn post_error_to_response(err: PostServiceError, chrome: LayoutChrome) -> Response {
    const SOURCE: &str = "infra::http::post_error_to_response";
    match err {
        PostServiceError::UnknownGroup(_)
        | PostServiceError::UnknownAuthor(_)
        | PostServiceError::UnknownPost(_) => render_not_found_response(chrome, err.to_string()),
        PostServiceError::Repo(err) => repo_error_to_http(SOURCE, err).into_response(),
        err => HttpError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_ids_must_be_positive_integers() {
        assert_eq!(parse_post_id("42"), Some(42));
        assert_eq!(parse_post_id("0"), None);
        assert_eq!(parse_post_id("-3"), None);
        assert_eq!(parse_post_id("abc"), None);
    }

    #[test]
    fn media_responses_guess_the_content_type() {
        let response = build_media_response("posts/abc-cat.gif", Bytes::from_static(b"GIF89a"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"image/gif"[..])
        );
        assert_eq!(
            response.headers().get(CONTENT_LENGTH).map(|v| v.as_bytes()),
            Some(&b"6"[..])
        );
        assert_eq!(
            response
                .headers()
                .get(X_CONTENT_TYPE_OPTIONS)
                .map(|v| v.as_bytes()),
            Some(&b"nosniff"[..])
        );
    }

    #[test]
    fn scriptable_media_is_served_as_opaque_bytes() {
        for path in ["posts/abc-x.svg", "posts/abc-page.html", "posts/abc-noext"] {
            let response = build_media_response(path, Bytes::from_static(b"<svg/>"));
            assert_eq!(
                response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
                Some(&b"application/octet-stream"[..]),
                "{path}"
            );
        }
    }
}
