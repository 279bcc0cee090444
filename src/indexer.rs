use anyhow::{Context, Result};
use std::{collections::HashSet, fs, path::Path};
use walkdir::{DirEntry, WalkDir};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// What the walk skips.
#[derive(Debug, Clone)]
pub struct ScanRules {
    /// Directory names pruned at any depth; their subtrees are never walked.
    pub excluded_folders: HashSet<String>,
    /// The UI's own icon, hidden only when it sits directly in the root.
    pub root_icon: String,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            excluded_folders: ["samples".to_string()].into_iter().collect(),
            root_icon: "ddr.png".to_string(),
        }
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walk `root` and return every image path relative to it, `/`-separated,
/// in lexical walk order. `None` yields an empty list without any I/O.
pub fn scan(root: Option<&Path>, rules: &ScanRules) -> Result<Vec<String>> {
    let Some(root) = root else { return Ok(Vec::new()) };

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, rules));

    let mut out = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            // The root itself vanishing is an error; unreadable children are skipped.
            Err(e) if e.depth() == 0 => {
                return Err(e).with_context(|| format!("walk {}", root.display()));
            }
            Err(e) => {
                tracing::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !is_file_entry(&entry) || !is_image(entry.path()) {
            continue;
        }
        if entry.depth() == 1 && entry.file_name().to_string_lossy().eq_ignore_ascii_case(&rules.root_icon) {
            continue;
        }
        let rel = entry.path().strip_prefix(root).with_context(|| format!("strip prefix {:?}", entry.path()))?;
        let rel: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        out.push(rel.join("/"));
    }
    Ok(out)
}

/// Regular files, plus symlinks whose target is a file. Directory links are
/// listed by the walk but never descended into.
fn is_file_entry(entry: &DirEntry) -> bool {
    if entry.file_type().is_file() {
        return true;
    }
    entry.path_is_symlink() && fs::metadata(entry.path()).is_ok_and(|m| m.is_file())
}

fn is_excluded_dir(entry: &DirEntry, rules: &ScanRules) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && rules.excluded_folders.contains(entry.file_name().to_string_lossy().as_ref())
}
