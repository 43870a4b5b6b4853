// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wbd` — the Workbridge daemon.
//!
//! `wbd serve` hosts the HTTP surface. `wbd produce` runs the pull loop
//! headless; launched producer workloads run this subcommand with their
//! parameters in the environment.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use wb_core::{EventCursor, Scope};
use wb_runner::{DockerRunner, KubeRunner, RunnerAdapter};
use wb_server::routes::streams::run_pull_loop;
use wb_server::upstream::UpstreamClient;
use wb_server::{env, error::ApiError, router, state::AppCtx, state::Config};
use wb_store::MemoryDocStore;

#[derive(Parser)]
#[command(name = "wbd", about = "Workbridge execution bridge daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host the HTTP surface.
    Serve,
    /// Run the pull+callback loop headless (inside producer workloads).
    Produce,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("wbd: runtime: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(async {
        match cli.command {
            Command::Serve => serve().await,
            Command::Produce => produce().await,
        }
    });
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "wbd failed");
            eprintln!("wbd: {}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing(state_dir: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match std::fs::create_dir_all(state_dir.join("logs")) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(state_dir.join("logs"), "wbd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
            Some(guard)
        }
        Err(_) => {
            fmt().with_env_filter(filter).init();
            None
        }
    }
}

fn build_runner() -> Arc<dyn RunnerAdapter> {
    match env::runner_backend().as_str() {
        "k8s" => Arc::new(KubeRunner::new(env::k8s_namespace())),
        _ => Arc::new(DockerRunner::new()),
    }
}

async fn serve() -> Result<(), ApiError> {
    let state_dir = env::state_dir()?;
    let _log_guard = init_tracing(&state_dir);
    let config = Config::from_env();

    let snapshot_path = state_dir.join("store.snapshot");
    let store = Arc::new(wb_store::snapshot::load(&snapshot_path));
    let ctx = Arc::new(AppCtx::new(store.clone(), build_runner(), None, config));

    // Final snapshot is a shutdown hook so registrations survive restarts.
    {
        let store = store.clone();
        let path = snapshot_path.clone();
        ctx.shutdown.register("store.snapshot", move || {
            let store = store.clone();
            let path = path.clone();
            async move {
                if let Err(e) = wb_store::snapshot::save(&store, &path) {
                    error!(error = %e, "final snapshot failed");
                }
            }
        });
    }

    let addr = env::bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Config(format!("bind {}: {}", addr, e)))?;
    info!(%addr, "wbd listening");

    let app = router(ctx.clone());
    let shutdown = ctx.shutdown.clone();
    let budget = ctx.config.shutdown_timeout;
    // The graceful-shutdown future cancels every stream and runs the
    // teardown hooks before the server stops accepting; by the time serve
    // drains, the long-lived responses have already closed.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            shutdown.run(budget).await;
        })
        .await
        .map_err(|e| ApiError::Fatal(e.to_string()))?;
    Ok(())
}

async fn produce() -> Result<(), ApiError> {
    let state_dir = env::state_dir().unwrap_or_else(|_| std::env::temp_dir().join("workbridge"));
    let _log_guard = init_tracing(&state_dir);
    let config = Config::from_env();

    let scope = Scope::new(
        std::env::var("WB_USER_ID").unwrap_or_default(),
        std::env::var("WB_PROJECT_ID").unwrap_or_default(),
    )?;
    let workspace_id = std::env::var("WB_WORKSPACE_ID")
        .map_err(|_| ApiError::Config("WB_WORKSPACE_ID is not set".into()))?;
    let session_id = std::env::var("WB_SESSION_ID").ok().filter(|s| !s.is_empty());
    let cursor = EventCursor::new(
        std::env::var("WB_SINCE_ID").ok().filter(|s| !s.is_empty()),
        std::env::var("WB_SINCE_TIME").ok().filter(|s| !s.is_empty()),
    );

    let upstream_url = config
        .upstream_url
        .clone()
        .ok_or_else(|| ApiError::Config("WB_UPSTREAM_URL is not set".into()))?;
    let client = UpstreamClient::new(
        upstream_url,
        config.upstream_token.clone(),
        config.upstream_audience.clone(),
    )?;

    let store = Arc::new(MemoryDocStore::new());
    let ctx = Arc::new(AppCtx::new(store, build_runner(), None, config));

    let consumer_id = std::env::var("WB_CONSUMER_ID").unwrap_or_default();
    info!(scope = %scope, %consumer_id, workspace_id = %workspace_id, "producer starting");

    // Bounded shutdown: stop pulling, notify upstream, let the loop's
    // final sync run inside the budget.
    {
        let client = client.clone();
        let scope = scope.clone();
        let consumer_id = consumer_id.clone();
        ctx.shutdown.register("upstream.stop", move || {
            let client = client.clone();
            let scope = scope.clone();
            let consumer_id = consumer_id.clone();
            async move {
                client.notify_stop(&scope, &consumer_id).await;
            }
        });
    }

    let loop_ctx = ctx.clone();
    let loop_scope = scope.clone();
    let pull = tokio::spawn(async move {
        run_pull_loop(loop_ctx, client, loop_scope, session_id, workspace_id, cursor, None).await;
    });

    wait_for_signal().await;
    ctx.shutdown.run(ctx.config.shutdown_timeout).await;
    let _ = pull.await;
    Ok(())
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
}
