use crate::cmd::load_config;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use reel_core::{paths, processed::ProcessedState};
use std::path::Path;

#[derive(Subcommand)]
pub enum ProcessedSubcommand {
    /// List processed slugs
    List,

    /// Unmark an identifier so the next run processes it again
    Forget { identifier: String },

    /// Unmark everything
    Clear,
}

pub fn run(root: &Path, subcmd: ProcessedSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let path = config.processed_path(root)?;
    let mut state = ProcessedState::load(&path).context("failed to load processed state")?;

    match subcmd {
        ProcessedSubcommand::List => {
            let slugs: Vec<&str> = state.processed().collect();
            if json {
                print_json(&slugs)?;
            } else if slugs.is_empty() {
                println!("Nothing processed yet.");
            } else {
                for slug in slugs {
                    println!("{slug}");
                }
            }
        }
        ProcessedSubcommand::Forget { identifier } => {
            let slug = paths::slugify(&identifier)?;
            let removed = state.forget(&slug);
            if removed {
                state.save(&path).context("failed to write processed state")?;
            }
            if json {
                print_json(&serde_json::json!({ "slug": slug, "removed": removed }))?;
            } else if removed {
                println!("Forgot '{slug}'.");
            } else {
                println!("'{slug}' was not marked processed.");
            }
        }
        ProcessedSubcommand::Clear => {
            state.clear();
            state.save(&path).context("failed to write processed state")?;
            if !json {
                println!("Processed state cleared.");
            } else {
                print_json(&serde_json::json!({ "cleared": true }))?;
            }
        }
    }
    Ok(())
}
