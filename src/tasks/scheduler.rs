use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::shutdown;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::services::{assignment_lifecycle, expiry, reporting};

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_rx, signal_task) = shutdown::broadcast_on_signal();

    let handles = vec![
        tokio::spawn(expiry_sweep_loop(state.clone(), shutdown_rx.clone())),
        tokio::spawn(monthly_report_loop(state.clone(), shutdown_rx.clone())),
        tokio::spawn(submission_recovery_loop(state.clone(), shutdown_rx)),
    ];

    tracing::info!(
        sweep_interval_seconds = state.settings().scheduler().expiry_sweep_interval_seconds,
        report_interval_seconds = state.settings().scheduler().monthly_report_interval_seconds,
        recovery_interval_seconds =
            state.settings().scheduler().submission_recovery_interval_seconds,
        "Scheduler started"
    );

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }
    signal_task.await?;

    tracing::info!("Scheduler stopped");
    Ok(())
}

async fn expiry_sweep_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings().scheduler().expiry_sweep_interval_seconds);
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match expiry::sweep(state.db(), primitive_now_utc()).await {
                    Ok(outcome) if outcome.modified > 0 => tracing::info!(
                        matched = outcome.matched,
                        modified = outcome.modified,
                        "Expiry sweep moved assignments to expired"
                    ),
                    Ok(_) => tracing::debug!("Expiry sweep found nothing overdue"),
                    Err(err) => tracing::error!(error = %err, "Expiry sweep failed"),
                }
            }
        }
    }
}

async fn monthly_report_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings().scheduler().monthly_report_interval_seconds);
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = reporting::run_monthly_rollup(state.db(), primitive_now_utc()).await {
                    tracing::error!(error = %err, "Monthly report rollup failed");
                }
            }
        }
    }
}

async fn submission_recovery_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let scheduler = state.settings().scheduler();
    let grace = time::Duration::seconds(
        i64::try_from(scheduler.submission_recovery_grace_seconds).unwrap_or(i64::MAX),
    );
    let mut tick = interval(Duration::from_secs(scheduler.submission_recovery_interval_seconds));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let stale_before = primitive_now_utc().saturating_sub(grace);
                if let Err(err) = assignment_lifecycle::recover_ungraded(&state, stale_before).await {
                    tracing::error!(error = %err, "Submission recovery failed");
                }
            }
        }
    }
}
