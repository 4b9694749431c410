use crate::cmd::{load_config, load_secrets, locator, RunExit};
use crate::output::print_json;
use anyhow::Context;
use reel_core::{
    config::Config,
    lock::{self, LeaseGuard},
    publish,
    runner::{BatchOutcome, BatchRunner, Progress},
    unit::UnitContext,
    ReelError,
};
use std::path::Path;

pub struct RunOptions {
    pub track_processed: bool,
    pub publish: bool,
    pub command: Vec<String>,
}

pub fn run(root: &Path, opts: RunOptions, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let secrets = load_secrets(root, &config)?;
    let locator = locator(root, &config)?;
    let ctx = UnitContext {
        root,
        secrets: &secrets,
        locator: &locator,
        timeout: config.runner.retry.timeout(),
    };
    let mut unit = config
        .unit
        .build(&ctx, &opts.command)
        .context("failed to build unit of work")?;

    let runner = build_runner(root, &config, opts.track_processed)?;
    let lease = acquire_lease(root, &config)?;

    let outcome = runner
        .run_with(unit.as_mut(), &mut |p: &Progress<'_>| {
            if !json {
                print_progress(p);
            }
        })
        .context("batch run failed")?;

    if let Some(lease) = lease {
        lease.release().context("failed to release lock marker")?;
    }

    if json {
        print_json(&outcome)?;
    } else {
        print_summary(&outcome);
    }

    match outcome {
        BatchOutcome::Halted { failed, reason, .. } => Err(RunExit::Halted {
            item: failed,
            reason,
        }
        .into()),
        BatchOutcome::Completed { .. } if opts.publish => {
            let videos_dir = if config.publish.archive_uploaded {
                Some(config.publish_videos_dir(root)?)
            } else {
                None
            };
            let report =
                publish::publish(root, &config.publish.steps, videos_dir.as_deref(), &secrets)
                    .context("publish failed")?;
            if !json {
                crate::cmd::publish::print_report(&report);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn build_runner(root: &Path, config: &Config, track_processed: bool) -> anyhow::Result<BatchRunner> {
    let mut runner = BatchRunner::new(config.pending_path(root)?).retry(config.runner.retry);
    if track_processed || config.runner.track_processed {
        runner = runner.track_processed(config.processed_path(root)?);
    }
    if let Some(history) = config.history_path(root)? {
        runner = runner.record_history(history);
    }
    if config.runner.skip_existing_videos {
        runner = runner.skip_existing_videos(config.video_dirs(root)?);
    }
    Ok(runner)
}

fn acquire_lease(root: &Path, config: &Config) -> anyhow::Result<Option<LeaseGuard>> {
    if !config.lock.enabled {
        return Ok(None);
    }
    let path = config.lock_path(root)?;
    match lock::acquire(&path, config.lock.stale_after()) {
        Ok(guard) => {
            tracing::info!(owner = %guard.lease().owner, path = %path.display(), "lock acquired");
            Ok(Some(guard))
        }
        Err(e @ ReelError::LockHeld { .. }) => Err(RunExit::LockHeld(e.to_string()).into()),
        Err(e) => Err(e).context("failed to acquire lock marker"),
    }
}

fn print_progress(progress: &Progress<'_>) {
    match progress {
        Progress::Started {
            index,
            total,
            identifier,
        } => println!("[{index}/{total}] {identifier}"),
        Progress::Skipped { reason, .. } => println!("  skipped: {reason}"),
        Progress::Retrying {
            attempt, reason, ..
        } => println!("  attempt {attempt} failed: {reason}; retrying"),
        Progress::Succeeded { .. } => println!("  done"),
        Progress::Failed { reason, .. } => println!("  failed: {reason}"),
    }
}

fn print_summary(outcome: &BatchOutcome) {
    match outcome {
        BatchOutcome::NothingToDo { skipped } if skipped.is_empty() => {
            println!("Nothing to process.");
        }
        BatchOutcome::NothingToDo { skipped } => {
            println!("Nothing to do: {} item(s) already handled.", skipped.len());
        }
        BatchOutcome::Completed { processed, skipped } => {
            println!(
                "Batch complete: {} processed, {} skipped.",
                processed.len(),
                skipped.len()
            );
        }
        BatchOutcome::Halted {
            processed,
            remaining,
            ..
        } => {
            println!(
                "Batch halted: {} processed, {} left in the pending list.",
                processed.len(),
                remaining.len()
            );
        }
    }
}
