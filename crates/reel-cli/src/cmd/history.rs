use crate::cmd::load_config;
use crate::output::{print_json, print_table};
use anyhow::Context;
use reel_core::history::{GenerationHistory, HistoryRecord};
use std::path::Path;

pub fn run(root: &Path, failed_only: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let Some(path) = config.history_path(root)? else {
        anyhow::bail!("history recording is disabled (files.history is null)");
    };
    let history = GenerationHistory::load(&path).context("failed to load history")?;

    let records: Vec<&HistoryRecord> = if failed_only {
        history.failures().collect()
    } else {
        history.records().iter().collect()
    };

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No history recorded.");
        return Ok(());
    }

    let rows = records
        .iter()
        .map(|r| {
            let status = if r.error { "FAILED" } else { "ok" };
            let detail = r
                .error_detail
                .as_ref()
                .map(|d| format!("{}  {}", d.dt, d.msg_error))
                .unwrap_or_default();
            vec![
                r.term.clone(),
                status.to_string(),
                r.generated_at.clone(),
                detail,
            ]
        })
        .collect();
    print_table(&["TERM", "STATUS", "GENERATED", "ERROR"], rows);
    Ok(())
}
