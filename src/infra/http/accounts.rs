use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    application::{
        auth::{AuthError, CurrentUser},
        error::HttpError,
    },
    domain::forms::FieldErrors,
    presentation::views::{
        LayoutChrome, LayoutContext, LoginContext, LoginTemplate, render_template_response,
    },
};

use super::{HttpState, SESSION_COOKIE, Viewer};

const LOGIN_FAILED_MESSAGE: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    username: String,
    password: String,
    next: String,
}

pub(super) async fn login_form(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Query(query): Query<NextQuery>,
) -> Response {
    render_login(&state, viewer.as_ref(), &query.next, "", &FieldErrors::new())
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    match state
        .auth
        .login(&form.username, &form.password, OffsetDateTime::now_utc())
        .await
    {
        Ok((user, session)) => {
            info!(
                target = "yatube::http::accounts",
                user_id = user.id,
                "user signed in"
            );
            let cookie = Cookie::build((SESSION_COOKIE, session.token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(state.auth_settings.secure_cookies)
                .expires(session.expires_at);
            let target = safe_next(&form.next).unwrap_or("/");
            (jar.add(cookie), Redirect::to(target)).into_response()
        }
        Err(AuthError::InvalidCredentials) => {
            let mut errors = FieldErrors::new();
            errors.add_non_field(LOGIN_FAILED_MESSAGE);
            render_login(&state, None, &form.next, &form.username, &errors)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(err) = state.auth.logout(cookie.value()).await {
            warn!(
                target = "yatube::http::accounts",
                error = %err,
                "failed to revoke session"
            );
        }
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    (jar, Redirect::to("/")).into_response()
}

fn render_login(
    state: &HttpState,
    viewer: Option<&CurrentUser>,
    next: &str,
    username: &str,
    errors: &FieldErrors,
) -> Response {
    let next = safe_next(next).unwrap_or_default();
    let content = LoginContext::new(&state.auth_settings.login_path, next, username, errors);
    let view = LayoutContext::new(LayoutChrome::new("Sign in", viewer), content);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

/// Accept only local absolute paths as post-login targets. Targets must already be
/// percent-encoded, since raw non-ASCII cannot go into a `Location` header.
fn safe_next(next: &str) -> Option<&str> {
    let next = next.trim();
    let local = next.starts_with('/')
        && next.is_ascii()
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(char::is_control);
    local.then_some(next)
}
