use anyhow::Result;
use directories::ProjectDirs;
use std::{collections::HashSet, fs, path::{Path, PathBuf}};

/// Returns the app-specific state directory, creating it if needed.
pub fn state_dir() -> Result<PathBuf> {
    let proj = ProjectDirs::from("com", "DiffusionDarkroom", "Darkroom")
        .ok_or_else(|| anyhow::anyhow!("could not determine state directory"))?;
    let dir = proj.data_dir().to_path_buf();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Directory holding the running executable; falls back to the cwd.
pub fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// When installed as `<project>/source/app-desktop`, the project is two levels up.
pub fn project_root(app_dir: &Path) -> PathBuf {
    let parent = app_dir.parent();
    let is_nested = app_dir.file_name().is_some_and(|n| n == "app-desktop")
        && parent.and_then(Path::file_name).is_some_and(|n| n == "source");
    match parent.and_then(Path::parent) {
        Some(grand) if is_nested => grand.to_path_buf(),
        _ => app_dir.to_path_buf(),
    }
}

/// `config.json` locations in priority order, duplicates removed.
pub fn config_candidates(app_dir: &Path, cwd: &Path) -> Vec<PathBuf> {
    let mut list = vec![
        project_root(app_dir).join("config.json"),
        cwd.join("config.json"),
        app_dir.join("config.json"),
    ];
    if let Some(parent) = app_dir.parent() {
        list.push(parent.join("config.json"));
    }
    dedup(list)
}

/// UI template locations in priority order.
pub fn template_candidates(app_dir: &Path, cwd: &Path) -> Vec<PathBuf> {
    let mut list = vec![
        app_dir.join("app-web").join("ddr.html"),
        app_dir.join("web-app").join("ddr.html"),
    ];
    if let Some(parent) = app_dir.parent() {
        list.push(parent.join("app-web").join("ddr.html"));
        list.push(parent.join("web-app").join("ddr.html"));
    }
    list.extend([
        app_dir.join("ddr.html"),
        cwd.join("source").join("app-web").join("ddr.html"),
        cwd.join("app-web").join("ddr.html"),
        cwd.join("web-app").join("ddr.html"),
        cwd.join("ddr.html"),
    ]);
    dedup(list)
}

pub fn find_template(explicit: Option<&Path>, app_dir: &Path, cwd: &Path) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return p.is_file().then(|| p.to_path_buf());
    }
    template_candidates(app_dir, cwd).into_iter().find(|p| p.is_file())
}

fn dedup(list: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|p| seen.insert(std::path::absolute(p).unwrap_or_else(|_| p.clone())))
        .collect()
}
