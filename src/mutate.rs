use std::{fs, io, path::Path};

use crate::error::{AppError, AppResult};
use crate::sandbox;

/// What a move meant to the user. Only drives the log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveKind {
    Favorited { name: String },
    Rated { stars: u8, name: String },
    RatingRemoved { name: String },
    Moved { from: String, to: String },
}

impl MoveKind {
    pub fn log_line(&self) -> String {
        match self {
            MoveKind::Favorited { name } => {
                format!("FILE: Image file favorited and moved to Favorites folder: {name}")
            }
            MoveKind::Rated { stars, name } => {
                let plural = if *stars > 1 { "s" } else { "" };
                format!("FILE: Image file set '{stars} Star{plural}' and renamed to: {name}")
            }
            MoveKind::RatingRemoved { name } => {
                format!("FILE: Image file rating removed and renamed to: {name}")
            }
            MoveKind::Moved { from, to } => format!("Successfully moved file: {from} -> {to}"),
        }
    }
}

/// Rating marker at the end of a filename: `_01`..`_05` right before the extension.
pub fn rating_of(file_name: &str) -> Option<u8> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    let marker = stem.get(stem.len().checked_sub(3)?..)?.as_bytes();
    match marker {
        [b'_', b'0', d @ b'1'..=b'5'] => Some(d - b'0'),
        _ => None,
    }
}

fn base_name(rel: &str) -> String {
    let rel = sandbox::normalize_rel(rel);
    rel.rsplit('/').next().unwrap_or_default().to_string()
}

fn has_segment(rel: &str, segment: &str) -> bool {
    sandbox::normalize_rel(rel).split('/').any(|s| s == segment)
}

/// Favoriting wins over a rating change when a single move is both.
pub fn classify_move(old_rel: &str, new_rel: &str, favorites_folder: &str) -> MoveKind {
    let from = base_name(old_rel);
    let to = base_name(new_rel);

    if has_segment(new_rel, favorites_folder) && !has_segment(old_rel, favorites_folder) {
        return MoveKind::Favorited { name: to };
    }
    match (rating_of(&from), rating_of(&to)) {
        (old, Some(stars)) if old != Some(stars) => MoveKind::Rated { stars, name: to },
        (Some(_), None) => MoveKind::RatingRemoved { name: to },
        _ => MoveKind::Moved { from, to },
    }
}

/// Move and delete inside the active root.
#[derive(Debug, Clone)]
pub struct FileMutator {
    favorites_folder: String,
}

impl FileMutator {
    pub fn new(favorites_folder: impl Into<String>) -> Self {
        Self { favorites_folder: favorites_folder.into() }
    }

    /// Rename `old_rel` to `new_rel`, both relative to `root`, creating the
    /// destination's parent directories. On failure the source is untouched.
    pub fn move_file(&self, root: &Path, old_rel: &str, new_rel: &str) -> AppResult<MoveKind> {
        let old_abs = sandbox::resolve(old_rel, root)?;
        let new_abs = sandbox::resolve(new_rel, root)?;

        if fs::symlink_metadata(&old_abs).is_err() {
            return Err(AppError::NotFound { what: "Source file", path: old_rel.to_string() });
        }

        if let Some(parent) = new_abs.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::io(format!("Failed to create directory {}", parent_rel(new_rel)), e)
                })?;
                tracing::info!("Created directory: {}", parent_rel(new_rel));
            }
        }

        rename_or_copy(&old_abs, &new_abs).map_err(|e| AppError::io("Failed to move file", e))?;

        let kind = classify_move(old_rel, new_rel, &self.favorites_folder);
        tracing::info!("{}", kind.log_line());
        Ok(kind)
    }

    /// Remove a single file. There is no trash.
    pub fn delete_file(&self, root: &Path, rel: &str) -> AppResult<()> {
        let abs = sandbox::resolve(rel, root)?;
        if fs::symlink_metadata(&abs).is_err() {
            return Err(AppError::NotFound { what: "File", path: rel.to_string() });
        }
        fs::remove_file(&abs).map_err(|e| AppError::io("Failed to delete file", e))?;
        tracing::info!("FILE: Image file deleted: {}", base_name(rel));
        Ok(())
    }
}

fn parent_rel(rel: &str) -> String {
    let rel = sandbox::normalize_rel(rel);
    match rel.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => ".".to_string(),
    }
}

#[cfg(unix)]
const CROSS_DEVICE: i32 = 18; // EXDEV
#[cfg(windows)]
const CROSS_DEVICE: i32 = 17; // ERROR_NOT_SAME_DEVICE
#[cfg(not(any(unix, windows)))]
const CROSS_DEVICE: i32 = -1;

/// Plain rename; across volumes fall back to copy-then-remove. A failed copy
/// removes whatever landed at `to` so the source stays the only copy.
fn rename_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE) => {
            if let Err(copy_err) = fs::copy(from, to) {
                let _ = fs::remove_file(to);
                return Err(copy_err);
            }
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mutator() -> FileMutator {
        FileMutator::new("Favorites")
    }

    fn lib_with(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for rel in files {
            let p = tmp.path().join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, rel.as_bytes()).unwrap();
        }
        tmp
    }

    #[test]
    fn rating_marker_parsing() {
        assert_eq!(rating_of("img_03.png"), Some(3));
        assert_eq!(rating_of("img_05.webp"), Some(5));
        assert_eq!(rating_of("img_06.png"), None);
        assert_eq!(rating_of("img_3.png"), None);
        assert_eq!(rating_of("img_03"), None);
        assert_eq!(rating_of("_03.png"), Some(3));
        assert_eq!(rating_of("03.png"), None);
    }

    #[test]
    fn classifies_rating_set() {
        let kind = classify_move("img.png", "img_03.png", "Favorites");
        assert_eq!(kind, MoveKind::Rated { stars: 3, name: "img_03.png".into() });
        assert_eq!(kind.log_line(), "FILE: Image file set '3 Stars' and renamed to: img_03.png");
    }

    #[test]
    fn classifies_rating_change_and_single_star() {
        let kind = classify_move("a/img_04.png", "a/img_01.png", "Favorites");
        assert_eq!(kind.log_line(), "FILE: Image file set '1 Star' and renamed to: img_01.png");
    }

    #[test]
    fn classifies_rating_removed() {
        let kind = classify_move("img_03.png", "img.png", "Favorites");
        assert_eq!(kind, MoveKind::RatingRemoved { name: "img.png".into() });
    }

    #[test]
    fn classifies_favoriting() {
        let kind = classify_move("x.png", "Favorites/x.png", "Favorites");
        assert_eq!(kind, MoveKind::Favorited { name: "x.png".into() });
    }

    #[test]
    fn favoriting_takes_precedence_over_rating() {
        let kind = classify_move("x.png", "Favorites/x_02.png", "Favorites");
        assert!(matches!(kind, MoveKind::Favorited { .. }));
    }

    #[test]
    fn leaving_favorites_or_same_rating_is_a_plain_move() {
        let kind = classify_move("Favorites/x_02.png", "other/x_02.png", "Favorites");
        assert_eq!(kind, MoveKind::Moved { from: "x_02.png".into(), to: "x_02.png".into() });
        assert_eq!(kind.log_line(), "Successfully moved file: x_02.png -> x_02.png");
    }

    #[test]
    fn favorites_must_be_a_whole_segment() {
        let kind = classify_move("x.png", "MyFavoritesOld/x.png", "Favorites");
        assert!(matches!(kind, MoveKind::Moved { .. }));
    }

    #[test]
    fn move_creates_parents_and_relocates() {
        let lib = lib_with(&["a.png"]);
        let kind = mutator().move_file(lib.path(), "a.png", r"Favorites\deep\a.png").unwrap();
        assert!(matches!(kind, MoveKind::Favorited { .. }));
        assert!(!lib.path().join("a.png").exists());
        assert!(lib.path().join("Favorites/deep/a.png").exists());
    }

    #[test]
    fn move_of_missing_source_is_not_found_and_creates_nothing() {
        let lib = lib_with(&[]);
        let err = mutator().move_file(lib.path(), "ghost.png", "sub/ghost.png").unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(!lib.path().join("sub").exists());
    }

    #[test]
    fn escaping_move_is_rejected_before_io() {
        let outer = TempDir::new().unwrap();
        let lib = outer.path().join("lib");
        fs::create_dir(&lib).unwrap();
        fs::write(lib.join("a.png"), b"x").unwrap();

        let err = mutator().move_file(&lib, "a.png", "../stolen.png").unwrap_err();
        assert!(matches!(err, AppError::NotContained(_)));
        assert!(lib.join("a.png").exists());
        assert!(!outer.path().join("stolen.png").exists());
    }

    #[test]
    fn failed_move_leaves_source_in_place() {
        let lib = lib_with(&["a.png", "blocker"]);
        // "blocker" is a file, so it cannot become a directory.
        let err = mutator().move_file(lib.path(), "a.png", "blocker/a.png").unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
        assert!(lib.path().join("a.png").exists());
    }

    #[cfg(unix)]
    #[test]
    fn links_leading_out_of_the_root_are_not_followed() {
        let outer = TempDir::new().unwrap();
        let lib = outer.path().join("lib");
        let elsewhere = outer.path().join("elsewhere");
        fs::create_dir_all(&lib).unwrap();
        fs::create_dir_all(&elsewhere).unwrap();
        fs::write(lib.join("a.png"), b"x").unwrap();
        fs::write(outer.path().join("secret.png"), b"s").unwrap();
        std::os::unix::fs::symlink(&elsewhere, lib.join("out")).unwrap();
        std::os::unix::fs::symlink(outer.path().join("secret.png"), lib.join("leak.png")).unwrap();

        let err = mutator().move_file(&lib, "a.png", "out/a.png").unwrap_err();
        assert!(matches!(err, AppError::NotContained(_)));
        assert!(lib.join("a.png").exists());
        assert!(!elsewhere.join("a.png").exists());

        let err = mutator().move_file(&lib, "leak.png", "mine.png").unwrap_err();
        assert!(matches!(err, AppError::NotContained(_)));
        assert!(matches!(mutator().delete_file(&lib, "leak.png"), Err(AppError::NotContained(_))));
        assert!(outer.path().join("secret.png").exists());
    }

    #[test]
    fn delete_removes_file() {
        let lib = lib_with(&["sub/b.jpg"]);
        mutator().delete_file(lib.path(), "sub/b.jpg").unwrap();
        assert!(!lib.path().join("sub/b.jpg").exists());
        assert!(lib.path().join("sub").exists());
    }

    #[test]
    fn delete_errors() {
        let lib = lib_with(&["sub/b.jpg"]);
        assert!(matches!(mutator().delete_file(lib.path(), "nope.png"), Err(AppError::NotFound { .. })));
        assert!(matches!(mutator().delete_file(lib.path(), "../x.png"), Err(AppError::NotContained(_))));
        assert!(matches!(mutator().delete_file(lib.path(), "sub"), Err(AppError::Io { .. })));
    }
}
