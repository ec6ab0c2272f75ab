use std::sync::Arc;

use analysis_core::{CancellationFlag, PolicyConfig};
use analysis_orchestrator::{ConsensusPipeline, SnapshotCollector};
use anyhow::{Context, Result};
use tokio::signal::unix::SignalKind;

mod config;
mod input;

use config::RunnerConfig;
use input::RunInput;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    // stdout carries the result document
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter())
            .init();
    }

    // 2. Runner and policy configuration
    let runner = RunnerConfig::from_env()?;
    let policy = match &runner.policy_path {
        Some(path) => PolicyConfig::load(path)
            .with_context(|| format!("failed to load policy {}", path.display()))?,
        None => {
            let mut policy = PolicyConfig::default();
            policy
                .apply_env_overrides()
                .context("invalid CONSENSUS_* override")?;
            policy
        }
    };
    tracing::info!(
        "Policy loaded (quant {:.2} / ensemble {:.2}, ensemble enabled: {}, guardrail enabled: {})",
        policy.blending.quant_weight,
        policy.blending.ensemble_weight,
        policy.ensemble.enabled,
        policy.guardrail.enabled
    );

    // 3. Pipeline; ensemble training is a one-time blocking step
    let pipeline = tokio::task::spawn_blocking(move || ConsensusPipeline::initialize(policy))
        .await
        .context("pipeline initialization task failed")?
        .context("invalid policy configuration")?;
    let pipeline = Arc::new(pipeline);

    // 4. Cancellation on SIGINT / SIGTERM
    let cancel = CancellationFlag::new();
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
        signal_flag.cancel();
    });

    // 5. Collect snapshots
    let input = RunInput::load(&runner.input_path)?;
    let market = input.market.clone();
    let symbols = input.symbols();
    let collector = SnapshotCollector::new(Arc::new(input.into_source()))
        .with_timeout(runner.fetch_timeout)
        .with_max_concurrency(runner.max_concurrency);
    let collected = collector
        .collect(&symbols, &cancel)
        .await
        .context("snapshot collection aborted")?;

    // 6. Run
    let run_pipeline = Arc::clone(&pipeline);
    let run_cancel = cancel.clone();
    let output = tokio::task::spawn_blocking(move || {
        run_pipeline.run(&collected.snapshots, &market, &run_cancel)
    })
    .await
    .context("pipeline task failed")?
    .context("consensus run aborted")?;

    tracing::info!(
        "Run complete: {}/{} picks ({} excluded, {} without ensemble)",
        output.summary.output,
        output.summary.requested,
        output.summary.excluded(),
        output.summary.ensemble_degraded
    );

    // 7. Emit
    let json = serde_json::to_string_pretty(&output).context("failed to serialize run output")?;
    match &runner.output_path {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}
