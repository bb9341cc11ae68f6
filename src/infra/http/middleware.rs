use std::{convert::Infallible, time::Instant};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use metrics::histogram;
use time::OffsetDateTime;
use tracing::{error, warn};
use url::form_urlencoded::byte_serialize;
use uuid::Uuid;

use crate::application::{
    auth::CurrentUser,
    error::{ErrorReport, HttpError},
};

use super::HttpState;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    histogram!("yatube_http_request_ms").record(elapsed_ms as f64);

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "yatube::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Attach the [`CurrentUser`] behind the session cookie, if any, to the request.
///
/// Lookup failures are logged and the request continues anonymously.
pub async fn resolve_session(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match state
            .auth
            .authenticate(cookie.value(), OffsetDateTime::now_utc())
            .await
        {
            Ok(Some(user)) => {
                request.extensions_mut().insert(user);
            }
            Ok(None) => {}
            Err(err) => warn!(
                target = "yatube::http::session",
                error = %err,
                "session lookup failed"
            ),
        }
    }

    next.run(request).await
}

/// Redirect anonymous requests to the login page, remembering where they were going.
pub async fn require_login(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.extensions().get::<CurrentUser>().is_some() {
        return next.run(request).await;
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    Redirect::to(&login_redirect(&state.auth_settings.login_path, target)).into_response()
}

pub(super) fn login_redirect(login_path: &str, next: &str) -> String {
    format!("{login_path}?next={}", encode_next(next))
}

// Slashes stay readable; everything else is form-encoded.
fn encode_next(path: &str) -> String {
    path.split('/')
        .map(|segment| byte_serialize(segment.as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join("/")
}

/// The requester, if signed in.
pub struct Viewer(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(parts.extensions.get::<CurrentUser>().cloned()))
    }
}

/// The signed-in requester on routes guarded by [`require_login`].
pub struct AuthUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                HttpError::new(
                    "infra::http::middleware::AuthUser",
                    StatusCode::UNAUTHORIZED,
                    "Authentication required",
                    "route is missing the login guard",
                )
            })
    }
}
