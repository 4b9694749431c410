use anyhow::Context;
use reel_core::{config::Config, io, paths, pending::PendingList};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing reel in: {}", root.display());

    // 1. Directory tree
    let dirs = [
        paths::REEL_DIR,
        paths::RUNTIME_DIR,
        paths::DROP_DIR,
        paths::MEDIA_AUDIO_DIR,
        paths::MEDIA_IMAGES_DIR,
        paths::MEDIA_VIDEOS_DIR,
        paths::MEDIA_SUBTITLES_DIR,
    ];
    for dir in dirs {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    // 2. config.yaml if missing
    let config_path = paths::config_path(root);
    let config = if !config_path.exists() {
        let cfg = Config::new(&project_name);
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load existing config.yaml")?
    };

    // 3. Empty pending list if missing
    let pending_path = config.pending_path(root)?;
    let mut body = serde_json::to_vec_pretty(&PendingList::default())?;
    body.push(b'\n');
    let shown = pending_path
        .strip_prefix(root)
        .unwrap_or(&pending_path)
        .display()
        .to_string();
    if io::write_if_missing(&pending_path, &body)? {
        println!("  created: {shown}");
    } else {
        println!("  exists:  {shown}");
    }

    // 4. Keep runtime state and keys out of version control
    for dir in [paths::RUNTIME_DIR, paths::SECRETS_DIR] {
        io::ensure_gitignore_entry(root, &format!("{dir}/"))
            .context("failed to update .gitignore")?;
    }

    println!("\nreel initialized successfully.");
    println!("Next: set unit.command in {} and run 'reel run'", paths::CONFIG_FILE);

    Ok(())
}
