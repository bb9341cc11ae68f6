//! Post authoring: create, edit and comment.

use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Multipart;
use tracing::warn;

use crate::{
    application::{auth::CurrentUser, error::HttpError, posts::PostServiceError},
    domain::forms::{CommentForm, FieldErrors, PostForm},
    presentation::views::{
        CreatePostTemplate, LayoutChrome, LayoutContext, PostFormContext, media_url,
        profile_url, render_not_found_response, render_template_response,
    },
};

use super::{
    AuthUser, HttpState,
    forms::{PostSubmission, UploadedImage, read_post_submission},
    public::{not_found_chrome, parse_post_id, post_error_to_response},
};

const SOURCE: &str = "infra::http::authoring";

enum FormMode {
    Create,
    Edit { post_id: i64, image: Option<String> },
}

pub(super) async fn create_form(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
) -> Response {
    render_post_form(
        &state,
        &user,
        FormMode::Create,
        &PostForm::default(),
        &FieldErrors::new(),
    )
    .await
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Response {
    let submission = match read_post_submission(&mut multipart).await {
        Ok(submission) => submission,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let content = match state
        .posts
        .check_post_form(&submission.form, submission.image_meta())
        .await
    {
        Ok(content) => content,
        Err(PostServiceError::Invalid(errors)) => {
            return render_post_form(&state, &user, FormMode::Create, &submission.form, &errors)
                .await;
        }
        Err(err) => return post_error_to_response(err, not_found_chrome(Some(&user))),
    };

    let stored = match store_image(&state, submission).await {
        Ok(stored) => stored,
        Err(response) => return response,
    };

    match state.posts.create_post(&user, content, stored.clone()).await {
        Ok(_) => Redirect::to(&profile_url(&user.username)).into_response(),
        Err(err) => {
            discard_image(&state, stored).await;
            post_error_to_response(err, not_found_chrome(Some(&user)))
        }
    }
}

pub(super) async fn edit_form(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(post_id) = parse_post_id(&raw_id) else {
        return unknown_post(&user, &raw_id);
    };

    match state.posts.editable_post(post_id, &user).await {
        Ok(post) => {
            let form = PostForm::prefilled(&post.text, post.group.as_ref().map(|group| group.id));
            let mode = FormMode::Edit {
                post_id,
                image: post.image,
            };
            render_post_form(&state, &user, mode, &form, &FieldErrors::new()).await
        }
        Err(PostServiceError::NotAuthor { .. }) => redirect_to_detail(post_id),
        Err(err) => post_error_to_response(err, not_found_chrome(Some(&user))),
    }
}

pub(super) async fn edit_submit(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let Some(post_id) = parse_post_id(&raw_id) else {
        return unknown_post(&user, &raw_id);
    };

    let current = match state.posts.editable_post(post_id, &user).await {
        Ok(post) => post,
        Err(PostServiceError::NotAuthor { .. }) => return redirect_to_detail(post_id),
        Err(err) => return post_error_to_response(err, not_found_chrome(Some(&user))),
    };

    let submission = match read_post_submission(&mut multipart).await {
        Ok(submission) => submission,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let content = match state
        .posts
        .check_post_form(&submission.form, submission.image_meta())
        .await
    {
        Ok(content) => content,
        Err(PostServiceError::Invalid(errors)) => {
            let mode = FormMode::Edit {
                post_id,
                image: current.image,
            };
            return render_post_form(&state, &user, mode, &submission.form, &errors).await;
        }
        Err(err) => return post_error_to_response(err, not_found_chrome(Some(&user))),
    };

    let stored = match store_image(&state, submission).await {
        Ok(stored) => stored,
        Err(response) => return response,
    };

    match state
        .posts
        .edit_post(&user, post_id, content, stored.clone())
        .await
    {
        Ok(_) => {
            if stored.is_some() {
                discard_image(&state, current.image).await;
            }
            redirect_to_detail(post_id)
        }
        Err(PostServiceError::NotAuthor { .. }) => {
            discard_image(&state, stored).await;
            redirect_to_detail(post_id)
        }
        Err(err) => {
            discard_image(&state, stored).await;
            post_error_to_response(err, not_found_chrome(Some(&user)))
        }
    }
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let Some(post_id) = parse_post_id(&raw_id) else {
        return unknown_post(&user, &raw_id);
    };

    match state.posts.add_comment(&user, post_id, &form).await {
        Ok(_) => redirect_to_detail(post_id),
        Err(err) => post_error_to_response(err, not_found_chrome(Some(&user))),
    }
}

async fn render_post_form(
    state: &HttpState,
    user: &CurrentUser,
    mode: FormMode,
    form: &PostForm,
    errors: &FieldErrors,
) -> Response {
    let groups = match state.posts.group_choices().await {
        Ok(groups) => groups,
        Err(err) => return post_error_to_response(err, not_found_chrome(Some(user))),
    };

    let (title, content) = match mode {
        FormMode::Create => (
            "New post",
            PostFormContext::new("/create/".to_string(), false, form, &groups, errors),
        ),
        FormMode::Edit { post_id, image } => {
            let mut content = PostFormContext::new(
                format!("/posts/{post_id}/edit/"),
                true,
                form,
                &groups,
                errors,
            );
            content.current_image_url = image.as_deref().map(media_url);
            ("Edit post", content)
        }
    };

    let view = LayoutContext::new(LayoutChrome::new(title, Some(user)), content);
    render_template_response(CreatePostTemplate { view }, StatusCode::OK)
}

/// Write the uploaded image, if any, returning its stored path.
async fn store_image(
    state: &HttpState,
    submission: PostSubmission,
) -> Result<Option<String>, Response> {
    let Some(UploadedImage { meta, data }) = submission.image else {
        return Ok(None);
    };

    let Some(format) = meta.format else {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Upload a valid image",
            "image format was not recognised",
        )
        .into_response());
    };

    match state.uploads.store(&meta.file_name, format, data).await {
        Ok(stored) => Ok(Some(stored.stored_path)),
        Err(err) => Err(HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to store image",
            &err,
        )
        .into_response()),
    }
}

async fn discard_image(state: &HttpState, stored: Option<String>) {
    let Some(path) = stored else {
        return;
    };
    if let Err(err) = state.uploads.delete(&path).await {
        warn!(
            target = SOURCE,
            path = %path,
            error = %err,
            "failed to remove stored image"
        );
    }
}

fn redirect_to_detail(post_id: i64) -> Response {
    Redirect::to(&format!("/posts/{post_id}/")).into_response()
}

fn unknown_post(user: &CurrentUser, raw_id: &str) -> Response {
    render_not_found_response(
        not_found_chrome(Some(user)),
        format!("`{raw_id}` is not a post id"),
    )
}
