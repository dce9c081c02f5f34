use std::future::IntoFuture;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::time::Duration;

use clap::ArgAction;
use clap::Parser;
use race_core::Engine;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower_race::http::router;
use tower_race::mock;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Accept answers over HTTP and announce the first correct one.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Drive the server with simulated users.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    run_mock: bool,

    /// Number of simulated users.
    #[arg(short = 'n', long, default_value_t = 1000)]
    users: usize,

    /// Shortest simulated network lag in milliseconds.
    #[arg(long, default_value_t = 10)]
    min_lag_ms: u64,

    /// Longest simulated network lag in milliseconds.
    #[arg(long, default_value_t = 1000)]
    max_lag_ms: u64,

    /// Probability that a simulated user answers correctly.
    #[arg(long, default_value_t = 0.25)]
    correct_ratio: f64,

    /// Capacity of the ingress queue.
    #[arg(long, default_value = "2048")]
    queue_capacity: NonZeroUsize,

    /// How long a submit request may wait for room in the queue, e.g. `500ms`.
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    submit_timeout: Duration,

    /// Seed for the simulated users.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let engine = Engine::new(args.queue_capacity);

    if let Some(event) = engine.subscribe_winner() {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Some(user_id) = event.recv().await {
                let stats = engine.snapshot();
                info!(
                    user_id,
                    total = stats.total,
                    correct = stats.correct,
                    incorrect = stats.incorrect,
                    "race decided"
                );
            }
        });
    }

    let engine_cancel = CancellationToken::new();
    let evaluator = engine.start(engine_cancel.clone())?;

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, args.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "listening");

    let server_cancel = CancellationToken::new();
    let shutdown = server_cancel.clone();
    let server = tokio::spawn(
        axum::serve(listener, router(engine.clone(), args.submit_timeout))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .into_future(),
    );

    let mock_cancel = CancellationToken::new();
    if args.run_mock {
        let options = mock::Options {
            users: args.users,
            base_url: format!("http://127.0.0.1:{}", addr.port()),
            min_delay: Duration::from_millis(args.min_lag_ms),
            max_delay: Duration::from_millis(args.max_lag_ms),
            correct_ratio: args.correct_ratio,
            seed: args.seed,
        };
        let cancel = mock_cancel.clone();
        tokio::spawn(async move {
            // Give the listener a moment before the first wave
            sleep(Duration::from_millis(150)).await;
            match mock::run(cancel, options).await {
                Ok(report) => info!(
                    sent = report.sent,
                    failed = report.failed,
                    cancelled = report.cancelled,
                    "simulated users finished"
                ),
                Err(err) => warn!(error = %err, "simulated users could not start"),
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    mock_cancel.cancel();
    server_cancel.cancel();
    match timeout(Duration::from_secs(3), server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!(error = %err, "server exited with an error"),
        Ok(Err(err)) => warn!(error = %err, "server task failed"),
        Err(_) => warn!("server did not shut down in time"),
    }

    engine_cancel.cancel();
    evaluator.await?;

    let stats = engine.snapshot();
    info!(
        total = stats.total,
        correct = stats.correct,
        incorrect = stats.incorrect,
        winner = ?stats.winner_id,
        "final stats"
    );
    Ok(())
}
