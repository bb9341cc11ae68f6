use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{
        auth::AuthService,
        error::AppError,
        pagination::Paginator,
        posts::PostService,
        repos::{
            CommentsRepo, CreateGroupParams, GroupsRepo, HealthRepo, PostsRepo, PostsWriteRepo,
            SessionsRepo, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheState, INDEX_KEY_PREFIX},
    config,
    domain::slug::{derive_slug, generate_unique_slug},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::CreateUser(args) => run_create_user(settings, args).await,
        config::Command::CreateGroup(args) => run_create_group(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings, true).await?;
    let state = build_http_state(repositories, &settings)?;

    let purge_handle = spawn_session_purge(state.auth.clone());
    let result = serve_http(&settings, state).await;

    purge_handle.abort();
    let _ = purge_handle.await;

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings, false).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!("database migrations applied");
    Ok(())
}

async fn run_create_user(
    settings: config::Settings,
    args: config::CreateUserArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings, true).await?;
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let sessions: Arc<dyn SessionsRepo> = repositories;
    let auth = AuthService::new(users, sessions, settings.auth.session_ttl);

    let user = auth
        .register(&args.username, args.display_name.as_deref(), &args.password)
        .await
        .map_err(|err| AppError::validation(err.to_string()))?;

    info!(user_id = user.id, username = %user.username, "user created");
    Ok(())
}

async fn run_create_group(
    settings: config::Settings,
    args: config::CreateGroupArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings, true).await?;
    let groups: Arc<dyn GroupsRepo> = repositories;

    let slug = match args.slug.as_deref() {
        Some(explicit) => {
            derive_slug(explicit).map_err(|err| AppError::validation(err.to_string()))?
        }
        None => generate_unique_slug(&args.title, |candidate| {
            let groups = groups.clone();
            async move {
                groups
                    .find_by_slug(&candidate)
                    .await
                    .map(|found| found.is_none())
            }
        })
        .await
        .map_err(|err| AppError::validation(err.to_string()))?,
    };

    let group = groups
        .create_group(CreateGroupParams {
            title: args.title.trim().to_string(),
            slug,
            description: args.description,
        })
        .await
        .map_err(|err| AppError::validation(err.to_string()))?;

    info!(group_id = group.id, slug = %group.slug, "group created");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
    migrate: bool,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::MissingDatabaseUrl)
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::Connect(err)))?;

    if migrate {
        PostgresRepositories::run_migrations(&pool)
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;
    }

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let posts = Arc::new(PostService::new(
        users_repo.clone(),
        groups_repo,
        posts_repo,
        posts_write_repo,
        comments_repo,
        Paginator::new(settings.pagination),
    ));
    let auth = Arc::new(AuthService::new(
        users_repo,
        sessions_repo,
        settings.auth.session_ttl,
    ));

    let uploads = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| {
                AppError::from(InfraError::upload_root(&settings.uploads.directory, err))
            })?,
    );

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = cache_config
        .enable_index_cache
        .then(|| CacheState::new(cache_config, INDEX_KEY_PREFIX));

    Ok(HttpState {
        posts,
        auth,
        health: health_repo,
        uploads,
        cache,
        auth_settings: settings.auth.clone(),
        max_request_bytes: usize::try_from(settings.uploads.max_request_bytes.get())
            .unwrap_or(usize::MAX),
    })
}

fn spawn_session_purge(auth: Arc<AuthService>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match auth.purge_expired(OffsetDateTime::now_utc()).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired sessions removed"),
                Err(err) => warn!(error = %err, "failed to purge expired sessions"),
            }
        }
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| {
            AppError::from(InfraError::Bind {
                addr: settings.server.addr,
                source: err,
            })
        })?;
    info!(addr = %settings.server.addr, "listening");

    let stopping = Arc::new(Notify::new());
    let signal = stopping.clone();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            info!("shutdown requested, draining connections");
            signal.notify_one();
        },
    )
    .into_future();

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_seconds = grace.as_secs(), "graceful shutdown timed out");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
