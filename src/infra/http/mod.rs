mod accounts;
mod authoring;
mod forms;
mod middleware;
mod public;

pub use middleware::{AuthUser, RequestContext, SESSION_COOKIE, Viewer};

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    application::{
        auth::AuthService,
        error::{ErrorReport, HttpError},
        posts::PostService,
        repos::{HealthRepo, RepoError},
    },
    cache::{CacheState, response_cache_layer},
    config::AuthSettings,
    infra::uploads::UploadStorage,
};

use self::middleware::{log_responses, require_login, resolve_session, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub posts: Arc<PostService>,
    pub auth: Arc<AuthService>,
    pub health: Arc<dyn HealthRepo>,
    pub uploads: Arc<UploadStorage>,
    pub cache: Option<CacheState>,
    pub auth_settings: AuthSettings,
    pub max_request_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    // Only the index page is cached.
    let cached_routes = Router::new().route("/", get(public::index));
    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(axum_middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let public_routes = Router::new()
        .route("/group/{slug}/", get(public::group_posts))
        .route("/profile/{username}/", get(public::profile))
        .route("/posts/{post_id}/", get(public::post_detail))
        .route(
            "/auth/login/",
            get(accounts::login_form).post(accounts::login_submit),
        )
        .route("/auth/logout/", post(accounts::logout))
        .route("/media/{*path}", get(public::serve_media))
        .route("/_health/db", get(public::db_health));

    let authoring_routes = Router::new()
        .route(
            "/create/",
            get(authoring::create_form).post(authoring::create_submit),
        )
        .route(
            "/posts/{post_id}/edit/",
            get(authoring::edit_form).post(authoring::edit_submit),
        )
        .route("/posts/{post_id}/comment/", post(authoring::add_comment))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_login,
        ));

    cached_routes
        .merge(public_routes)
        .merge(authoring_routes)
        .fallback(public::not_found)
        .layer(DefaultBodyLimit::max(state.max_request_bytes))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_session,
        ))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Integrity { message } => HttpError::new(
            source,
            StatusCode::CONFLICT,
            "Integrity constraint violated",
            message,
        ),
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}
