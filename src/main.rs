// ghcache binary entry point.
// Serves the cache endpoints or runs one-shot store maintenance commands.

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ghcache::cache::{Cache, SqliteStore, Ttl, sweeper};
use ghcache::config::{self, Command, ServeArgs, Settings};
use ghcache::error::AppError;
use ghcache::{http, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let (args, settings) = match config::load_with_cli() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("ghcache: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = telemetry::init(&settings.logging) {
        eprintln!("ghcache: {err}");
        return ExitCode::FAILURE;
    }

    let command = args
        .command
        .unwrap_or_else(|| Command::Serve(Box::<ServeArgs>::default()));

    match run(command, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "ghcache exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: Settings) -> Result<(), AppError> {
    let store = SqliteStore::open(&settings.store.path, settings.store.busy_timeout)?;
    let cache = Cache::new(store);

    match command {
        Command::Serve(_) => serve(cache, &settings).await,
        Command::Get(args) => {
            match cache.entry(&args.key).await? {
                Some(entry) => println!("{}", entry.value),
                None => println!("miss: {}", args.key),
            }
            Ok(())
        }
        Command::Set(args) => {
            let ttl = args.ttl_seconds.map(Ttl::seconds);
            cache.backend().set(&args.key, &args.value, ttl).await?;
            println!("stored {}", args.key);
            Ok(())
        }
        Command::Sweep(_) => {
            let removed = cache.sweep().await?;
            println!("removed {removed} expired entries");
            Ok(())
        }
    }
}

async fn serve(cache: Cache, settings: &Settings) -> Result<(), AppError> {
    let shutdown = CancellationToken::new();
    let sweep_task = settings
        .sweep
        .interval
        .map(|interval| sweeper::spawn(cache.clone(), interval, shutdown.clone()));

    let listener = TcpListener::bind(settings.server.addr).await?;
    info!(
        addr = %settings.server.addr,
        store = %settings.store.path.display(),
        "serving cache endpoints"
    );

    let signal = shutdown.clone();
    axum::serve(listener, http::router(cache))
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                error!("failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            signal.cancel();
        })
        .await?;

    match sweep_task {
        Some(task) => {
            sweeper::stop(task, &shutdown).await;
        }
        None => shutdown.cancel(),
    }
    info!("shutdown complete");
    Ok(())
}
