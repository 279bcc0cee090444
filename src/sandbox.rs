use std::path::{Component, Path, PathBuf};

use path_jail::Jail;

use crate::error::AppError;

/// Accepts both separators from request payloads and drops leading slashes.
pub fn normalize_rel(p: &str) -> String {
    let s = p.replace('\\', "/");
    let s = s.trim_start_matches('/');
    s.to_string()
}

/// Percent-decode a URL path after stripping any query string.
pub fn decode_request_path(uri_path: &str) -> String {
    let path = uri_path.split_once('?').map(|(p, _)| p).unwrap_or(uri_path);
    match urlencoding::decode(path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(path.as_bytes())).into_owned(),
    }
}

/// Join `request_path` onto `root` and check the result cannot reach outside
/// it. Two layers:
///
/// 1. Lexical: `.`/`..` are collapsed without touching the filesystem, and
///    anything that climbs above `root` or smuggles in a drive prefix or
///    absolute component is rejected.
/// 2. Physical: the nearest existing ancestor of the joined path is
///    canonicalized (following symlinks) and must lie inside the root jail.
///    A link inside the library that points elsewhere is rejected here.
///
/// The returned path is the lexical join, so it always has `root` as a prefix.
pub fn resolve(request_path: &str, root: &Path) -> Result<PathBuf, AppError> {
    let joined = lexical_join(request_path, root)?;

    let canonical_root = root.canonicalize().map_err(|e| AppError::io("Image root folder unavailable", e))?;
    let jail = Jail::new(&canonical_root).map_err(|_| AppError::Internal("Image root folder unavailable".into()))?;

    let existing = joined.ancestors().find(|p| p.exists()).unwrap_or(root);
    let real = existing.canonicalize().map_err(|e| AppError::io("Failed to resolve path", e))?;
    if real != canonical_root && jail.contains(&real).is_err() {
        return Err(AppError::NotContained(request_path.to_string()));
    }
    Ok(joined)
}

fn lexical_join(request_path: &str, root: &Path) -> Result<PathBuf, AppError> {
    let rel = normalize_rel(request_path);
    let rejected = || AppError::NotContained(request_path.to_string());

    let mut segments: Vec<&str> = Vec::new();
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop().ok_or_else(rejected)?;
            }
            name => {
                let mut comps = Path::new(name).components();
                match (comps.next(), comps.next()) {
                    (Some(Component::Normal(_)), None) => segments.push(name),
                    _ => return Err(rejected()),
                }
            }
        }
    }

    let mut out = root.to_path_buf();
    out.extend(segments);
    if !out.starts_with(root) {
        return Err(rejected());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn root() -> PathBuf {
        if cfg!(windows) { PathBuf::from(r"C:\lib") } else { PathBuf::from("/lib") }
    }

    #[test]
    fn joins_plain_relative_paths() {
        let p = lexical_join("sub/c.jpg", &root()).unwrap();
        assert_eq!(p, root().join("sub").join("c.jpg"));
    }

    #[test]
    fn accepts_backslashes_and_leading_slash() {
        let p = lexical_join(r"\sub\c.jpg", &root()).unwrap();
        assert_eq!(p, root().join("sub").join("c.jpg"));
    }

    #[test]
    fn collapses_inner_parent_segments() {
        let p = lexical_join("sub/../a.png", &root()).unwrap();
        assert_eq!(p, root().join("a.png"));
    }

    #[test]
    fn rejects_escape_above_root() {
        assert!(matches!(lexical_join("../etc/passwd", &root()), Err(AppError::NotContained(_))));
        assert!(matches!(lexical_join("sub/../../x", &root()), Err(AppError::NotContained(_))));
    }

    #[test]
    fn sibling_with_common_prefix_is_not_inside() {
        // "/lib/../libx/a.png" must not be accepted as being under "/lib".
        assert!(lexical_join("../libx/a.png", &root()).is_err());
    }

    #[test]
    fn rejection_names_only_the_input() {
        let err = lexical_join("../../secret.png", &root()).unwrap_err();
        assert_eq!(err.to_string(), "path outside allowed directory: ../../secret.png");
    }

    #[cfg(windows)]
    #[test]
    fn rejects_drive_prefixed_segments() {
        assert!(lexical_join("C:/Windows/win.ini", &root()).is_err());
    }

    #[test]
    fn decodes_percent_escapes_and_strips_query() {
        assert_eq!(decode_request_path("/my%20pics/a%2Bb.png?v=3"), "/my pics/a+b.png");
        assert_eq!(decode_request_path("/plain.png"), "/plain.png");
    }

    fn library() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let lib = tmp.path().join("lib");
        fs::create_dir_all(lib.join("sub")).unwrap();
        fs::write(lib.join("sub/c.jpg"), b"c").unwrap();
        fs::write(tmp.path().join("secret.txt"), b"top secret").unwrap();
        fs::create_dir(tmp.path().join("outside")).unwrap();
        (tmp, lib)
    }

    #[test]
    fn resolves_existing_and_new_paths_inside_root() {
        let (_tmp, lib) = library();
        assert_eq!(resolve("sub/c.jpg", &lib).unwrap(), lib.join("sub").join("c.jpg"));
        assert_eq!(resolve("new/deeper/x.png", &lib).unwrap(), lib.join("new").join("deeper").join("x.png"));
        assert_eq!(resolve("", &lib).unwrap(), lib);
    }

    #[test]
    fn lexical_escape_is_rejected_before_touching_disk() {
        let (_tmp, lib) = library();
        let err = resolve("../secret.txt", &lib).unwrap_err();
        assert_eq!(err.to_string(), "path outside allowed directory: ../secret.txt");
    }

    #[cfg(unix)]
    #[test]
    fn file_symlink_out_of_root_is_rejected() {
        let (tmp, lib) = library();
        std::os::unix::fs::symlink(tmp.path().join("secret.txt"), lib.join("leak.txt")).unwrap();
        let err = resolve("leak.txt", &lib).unwrap_err();
        assert!(matches!(err, AppError::NotContained(_)));
        assert_eq!(err.to_string(), "path outside allowed directory: leak.txt");
    }

    #[cfg(unix)]
    #[test]
    fn directory_symlink_out_of_root_is_rejected_for_new_targets() {
        let (tmp, lib) = library();
        std::os::unix::fs::symlink(tmp.path().join("outside"), lib.join("out")).unwrap();
        assert!(matches!(resolve("out/new.png", &lib), Err(AppError::NotContained(_))));
        assert!(matches!(resolve("out/a/b/new.png", &lib), Err(AppError::NotContained(_))));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_is_allowed() {
        let (_tmp, lib) = library();
        std::os::unix::fs::symlink(lib.join("sub/c.jpg"), lib.join("alias.jpg")).unwrap();
        assert_eq!(resolve("alias.jpg", &lib).unwrap(), lib.join("alias.jpg"));
    }

    #[test]
    fn missing_root_is_not_a_containment_error() {
        let (tmp, _lib) = library();
        let gone = tmp.path().join("gone");
        assert!(matches!(resolve("a.png", &gone), Err(AppError::Io { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn escapes_are_always_rejected(
            depth in 0usize..4,
            extra in 1usize..4,
            tail in "[a-z]{1,8}(\\.png)?",
            backslash in any::<bool>(),
        ) {
            let sep = if backslash { "\\" } else { "/" };
            let mut parts: Vec<String> = (0..depth).map(|i| format!("d{i}")).collect();
            parts.extend(std::iter::repeat("..".to_string()).take(depth + extra));
            parts.push(tail);
            let attempt = parts.join(sep);
            prop_assert!(lexical_join(&attempt, &root()).is_err(), "accepted {}", attempt);
        }

        #[test]
        fn accepted_paths_stay_under_root(segs in prop::collection::vec("[a-z]{1,6}|\\.\\.|\\.", 0..8)) {
            let attempt = segs.join("/");
            if let Ok(p) = lexical_join(&attempt, &root()) {
                prop_assert!(p.starts_with(root()));
            }
        }
    }
}
