use crate::cmd::load_config;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use reel_core::{paths, pending::PendingList};
use std::path::Path;

#[derive(Subcommand)]
pub enum PendingSubcommand {
    /// List queued identifiers in processing order
    List,

    /// Append identifiers not already queued
    Add {
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Empty the pending list
    Clear,
}

pub fn run(root: &Path, subcmd: PendingSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let path = config.pending_path(root)?;
    let mut list = PendingList::load(&path).context("failed to load pending list")?;

    match subcmd {
        PendingSubcommand::List => {
            if json {
                print_json(&list)?;
            } else if list.is_empty() {
                println!("Pending list is empty.");
            } else {
                for (i, id) in list.pending.iter().enumerate() {
                    println!("{:>3}. {id}", i + 1);
                }
            }
        }
        PendingSubcommand::Add { identifiers } => {
            for id in &identifiers {
                paths::slugify(id).with_context(|| format!("cannot queue '{id}'"))?;
            }
            let added = list.extend_unique(identifiers);
            list.save(&path).context("failed to write pending list")?;
            if json {
                print_json(&serde_json::json!({ "added": added, "pending": list.len() }))?;
            } else {
                println!("Added {added} item(s); {} pending.", list.len());
            }
        }
        PendingSubcommand::Clear => {
            let removed = list.len();
            PendingList::default()
                .save(&path)
                .context("failed to write pending list")?;
            if json {
                print_json(&serde_json::json!({ "removed": removed }))?;
            } else {
                println!("Cleared {removed} pending item(s).");
            }
        }
    }
    Ok(())
}
