use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc};

use sumcache::{
    application::{error::AppError, repos::CachedSumsRepo, sums::SumService},
    config,
    infra::{
        db::SqliteRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState},
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
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
        config::Command::Sum(args) => run_sum(settings, args).await,
        config::Command::Cache(args) => run_cache(settings, args).await,
    }
}

async fn init_repositories(settings: &config::Settings) -> Result<Arc<SqliteRepositories>, AppError> {
    let pool = SqliteRepositories::connect(&settings.database)
        .await
        .map_err(AppError::from)?;

    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(AppError::from)?;

    Ok(Arc::new(SqliteRepositories::new(pool)))
}

fn build_sum_service(repositories: &Arc<SqliteRepositories>) -> Arc<SumService> {
    let repo: Arc<dyn CachedSumsRepo> = repositories.clone();
    Arc::new(SumService::new(repo))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let state = ApiState {
        sums: build_sum_service(&repositories),
        db: repositories.clone(),
        rate_limiter: Arc::new(ApiRateLimiter::new(
            settings.rate_limit.window,
            settings.rate_limit.max_requests.get(),
        )),
        max_numbers: settings.sums.max_numbers.get(),
    };

    let result = serve_http(&settings, state).await;

    repositories.close().await;
    info!(target: "sumcache::serve", "database pool closed");

    result
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state, &settings.http, &settings.cors);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target: "sumcache::serve",
        addr = %settings.server.addr,
        "listening for requests"
    );

    let stop = Arc::new(Notify::new());
    let stop_signal = stop.clone();
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { stop_signal.notified().await })
    .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        () = shutdown_signal() => {}
    }

    info!(
        target: "sumcache::serve",
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "shutdown requested; draining connections"
    );
    stop.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target: "sumcache::serve",
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "sumcache::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target: "sumcache::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run_sum(settings: config::Settings, args: config::SumArgs) -> Result<(), AppError> {
    let max_numbers = settings.sums.max_numbers.get();
    if args.numbers.len() > max_numbers {
        return Err(AppError::validation(format!(
            "Maximum {max_numbers} numbers allowed"
        )));
    }

    let repositories = init_repositories(&settings).await?;
    let service = build_sum_service(&repositories);

    let result = service.resolve(&args.numbers).await;
    repositories.close().await;
    let outcome = result?;

    print_json(&serde_json::json!({
        "sum": outcome.sum,
        "cached": outcome.cached,
        "id": outcome.id,
    }))
}

async fn run_cache(settings: config::Settings, args: config::CacheArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let service = build_sum_service(&repositories);

    let result = match args.command {
        config::CacheCommand::List(_) => match service.list_cached().await {
            Ok(records) => print_json(&records),
            Err(err) => Err(err.into()),
        },
        config::CacheCommand::Clear(_) => match service.clear_cached().await {
            Ok(deleted) => {
                info!(target: "sumcache::cache", deleted, "cache cleared");
                print_json(&serde_json::json!({ "deleted": deleted }))
            }
            Err(err) => Err(err.into()),
        },
    };

    repositories.close().await;
    result
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
