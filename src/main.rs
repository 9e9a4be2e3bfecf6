use std::{process, sync::Arc};

use confido::{
    application::{
        cache::ConfigCache,
        error::AppError,
        repos::{RevisionsRepo, UsersRepo},
        revisions::RevisionStore,
        tokens::TokenService,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

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
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_api_state(repositories, &settings)?;

    let sweeper = state.cache.spawn_sweeper(settings.cache.sweep_interval);

    let result = serve_http(&settings, state).await;

    // Bound the sweeper handoff by the graceful shutdown budget.
    if tokio::time::timeout(settings.server.graceful_shutdown, sweeper.stop())
        .await
        .is_err()
    {
        error!("cache sweeper did not stop within the shutdown budget");
    }

    result
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_api_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApiState, AppError> {
    let secret = settings
        .auth
        .secret
        .as_deref()
        .ok_or_else(|| InfraError::configuration("auth secret is not configured"))
        .map_err(AppError::from)?;

    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let revisions_repo: Arc<dyn RevisionsRepo> = repositories;

    let tokens = Arc::new(TokenService::new(users_repo, secret));
    let cache = Arc::new(ConfigCache::new(
        RevisionStore::new(revisions_repo),
        settings.cache.ttl,
    ));

    Ok(ApiState { tokens, cache })
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.bind_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.bind_addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
