use crate::cmd::{load_config, locator};
use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, identifier: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let locator = locator(root, &config)?;
    let found = locator
        .locate(identifier)
        .with_context(|| format!("cannot locate artifacts for '{identifier}'"))?;

    if json {
        let entries: Vec<serde_json::Value> = found
            .entries
            .iter()
            .map(|(kind, path)| {
                serde_json::json!({
                    "kind": kind,
                    "path": path,
                    "exists": path.exists(),
                })
            })
            .collect();
        return print_json(&serde_json::json!({
            "identifier": identifier,
            "slug": found.slug,
            "artifacts": entries,
        }));
    }

    println!("{identifier} -> {}", found.slug);
    let rows = found
        .entries
        .iter()
        .map(|(kind, path)| {
            let exists = if path.exists() { "yes" } else { "no" };
            vec![
                kind.to_string(),
                exists.to_string(),
                path.display().to_string(),
            ]
        })
        .collect();
    print_table(&["KIND", "EXISTS", "PATH"], rows);
    Ok(())
}
