use crate::cmd::{load_config, RunExit};
use crate::output::print_json;
use anyhow::Context;
use reel_core::gatekeeper::{GateOutcome, Gatekeeper};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let gatekeeper = Gatekeeper::new(
        config.pending_path(root)?,
        config.drop_dir(root)?,
        config.lock_path(root)?,
    )
    .skip_processed(config.processed_path(root)?)
    .stale_after(config.lock.stale_after());

    let outcome = gatekeeper.run().context("gate failed")?;

    if json {
        print_json(&outcome)?;
    } else {
        match &outcome {
            GateOutcome::NothingToDo => println!("Nothing new in the drop directory."),
            GateOutcome::Deferred { reason } => println!("Deferred: {reason}."),
            GateOutcome::Queued { count, files } => {
                println!("Queued {count} item(s) from {} file(s).", files.len());
                for file in files {
                    println!("  {file}");
                }
            }
        }
    }

    match outcome {
        GateOutcome::NothingToDo => Ok(()),
        GateOutcome::Queued { .. } => Err(RunExit::Queued.into()),
        GateOutcome::Deferred { .. } => Err(RunExit::Deferred.into()),
    }
}
