use std::{process, sync::Arc};

use listfeed::{
    application::{
        checkpoint::CheckpointStore,
        error::AppError,
        identity::{IdentityError, IdentityService},
        indexer::PostIndexer,
        ingest::Ingestor,
        retention::RetentionCompactor,
    },
    cache::{HandleCache, HandleCacheConfig},
    config,
    infra::{
        db::PostgresRepositories, error::InfraError, firehose::FirehoseConnector,
        identity::XrpcIdentityResolver, telemetry,
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
        .unwrap_or(config::Command::Ingest(Box::<config::IngestArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Ingest(_) => run_ingest(settings).await,
        config::Command::Resolve(args) => run_resolve(settings, args).await,
    }
}

async fn run_ingest(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let checkpoints = CheckpointStore::new(repositories.clone(), settings.firehose.service.clone());
    let retention = RetentionCompactor::from_hours(
        repositories.clone(),
        settings.retention.retain_hours.get(),
    );
    let indexer = PostIndexer::new(repositories);
    let connector = FirehoseConnector::new(settings.firehose.endpoint.clone());

    let ingestor = Ingestor::new(
        Arc::new(connector),
        Arc::new(indexer),
        checkpoints,
        retention,
        settings.firehose.reconnect_delay,
    );

    info!(
        endpoint = %settings.firehose.endpoint,
        service = %settings.firehose.service,
        retain_hours = settings.retention.retain_hours.get(),
        "starting ingestion"
    );

    ingestor.run().await;
    Ok(())
}

async fn run_resolve(settings: config::Settings, args: config::ResolveArgs) -> Result<(), AppError> {
    let resolver = XrpcIdentityResolver::new(settings.identity.service_url.clone())?;

    let cache = if settings.identity.cache_enabled {
        let cache = HandleCache::open(HandleCacheConfig::from(&settings.identity))
            .await
            .map_err(IdentityError::from)?;
        Some(cache)
    } else {
        None
    };

    let service = IdentityService::new(Arc::new(resolver), cache);

    let resolved = match (args.target.handle, args.target.did) {
        (Some(handle), None) => service.did_for_handle(&handle).await?,
        (None, Some(did)) => service.handle_for_did(&did).await?,
        _ => {
            return Err(AppError::validation(
                "exactly one of --handle or --did is required",
            ));
        }
    };

    println!("{resolved}");
    Ok(())
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
