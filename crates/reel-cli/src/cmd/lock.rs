use crate::cmd::load_config;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use reel_core::lock::{self, MarkerState};
use std::path::Path;

#[derive(Subcommand)]
pub enum LockSubcommand {
    /// Show whether the lock marker is present and who holds it
    Status,

    /// Remove the lock marker regardless of owner
    Release,
}

pub fn run(root: &Path, subcmd: LockSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let path = config.lock_path(root)?;

    match subcmd {
        LockSubcommand::Status => {
            let state = lock::inspect(&path).context("failed to read lock marker")?;
            let now = chrono::Utc::now();
            let stale_after = config.lock.stale_after();
            if json {
                let value = match &state {
                    MarkerState::Absent => serde_json::json!({ "held": false }),
                    MarkerState::Lease(lease) => serde_json::json!({
                        "held": true,
                        "lease": lease,
                        "stale": lease.is_stale(stale_after, now),
                    }),
                    MarkerState::Opaque { modified } => serde_json::json!({
                        "held": true,
                        "modified": modified,
                    }),
                };
                return print_json(&value);
            }
            match state {
                MarkerState::Absent => println!("Lock: free"),
                MarkerState::Lease(lease) => {
                    let minutes = lease.age(now).num_minutes();
                    let stale = if lease.is_stale(stale_after, now) {
                        " (stale)"
                    } else {
                        ""
                    };
                    println!("Lock: held{stale}");
                    println!("  kind:   {}", lease.kind);
                    println!("  owner:  {}", lease.owner);
                    println!("  pid:    {}", lease.pid);
                    println!("  since:  {} ({minutes} min ago)", lease.acquired_at);
                }
                MarkerState::Opaque { modified } => {
                    println!("Lock: held (no lease information)");
                    if let Some(m) = modified {
                        println!("  modified: {m}");
                    }
                }
            }
        }
        LockSubcommand::Release => {
            let removed = lock::force_release(&path).context("failed to remove lock marker")?;
            if json {
                print_json(&serde_json::json!({ "released": removed }))?;
            } else if removed {
                println!("Lock marker removed: {}", path.display());
            } else {
                println!("No lock marker at {}", path.display());
            }
        }
    }
    Ok(())
}
