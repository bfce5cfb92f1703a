mod app;
mod cli;
mod config;
mod events;
mod exec;
mod hosts;
mod logging;
mod runtime;
mod state;
#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use clap::Parser;
use system_utils::path::expand_tilde;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cli::Args;
use crate::config::{load_console_config, resolve_settings};
use crate::exec::{Executor, ProcessExecutor};
use crate::logging::init_tracing;
use crate::runtime::spawn_runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_guard = init_tracing(&expand_tilde(&args.log_dir), args.log_to_stderr)?;

    let config = load_console_config(args.config.as_deref())?;
    let settings = resolve_settings(config)?;
    info!(
        registry = %settings.registry_path.display(),
        "stackyard starting"
    );

    let shutdown = CancellationToken::new();
    let executor: Arc<dyn Executor> = Arc::new(ProcessExecutor::new(settings.ssh.clone()));
    let (handle, runtime) = spawn_runtime(&settings, executor, shutdown.clone());
    let signal = tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let outcome = tokio::select! {
        result = app::run(args.command, &settings, &handle) => result,
        _ = shutdown.cancelled() => Err(anyhow::anyhow!("interrupted")),
    };

    handle.shutdown();
    let _ = runtime.await;
    signal.abort();

    let succeeded = match outcome {
        Ok(succeeded) => succeeded,
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            false
        }
    };
    drop(log_guard);
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    shutdown.cancel();
}
