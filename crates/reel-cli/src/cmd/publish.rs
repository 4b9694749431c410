use crate::cmd::{load_config, load_secrets};
use crate::output::print_json;
use anyhow::Context;
use reel_core::publish::{self, PublishReport};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let secrets = load_secrets(root, &config)?;
    let videos_dir = if config.publish.archive_uploaded {
        Some(config.publish_videos_dir(root)?)
    } else {
        None
    };

    let report = publish::publish(root, &config.publish.steps, videos_dir.as_deref(), &secrets)
        .context("publish failed")?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn print_report(report: &PublishReport) {
    for step in &report.steps {
        println!("  step ok: {step}");
    }
    match &report.archive_dir {
        Some(dir) => println!(
            "Archived {} file(s) into {}",
            report.archived.len(),
            dir.display()
        ),
        None => println!("Nothing to archive."),
    }
}
