//! Application configuration: built-in defaults with an optional `config.json`
//! overlay. The overlay is parsed into a patch type whose fields are all
//! optional, so merging is a typed walk rather than a map merge and unknown
//! keys are rejected at parse time.

use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::indexer::ScanRules;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub web: WebConfig,
    pub desktop: DesktopConfig,
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebConfig {
    pub model_filters: Vec<ModelFilter>,
    pub image_size: ImageSize,
    pub paging: Paging,
    pub zoom: Zoom,
    pub debug_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelFilter {
    pub label: String,
    pub contains_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub min: u32,
    pub max: u32,
    pub default: u32,
    pub step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paging {
    pub options: Vec<u32>,
    pub default: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zoom {
    pub default: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryConfig {
    pub excluded_folders: Vec<String>,
    pub icon_file: String,
    pub favorites_folder: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let filter = |label: &str, text: &str| ModelFilter { label: label.into(), contains_text: text.into() };
        Self {
            web: WebConfig {
                model_filters: vec![
                    filter("Flux", "flux"),
                    filter("Qwen", "qwen"),
                    filter("ZIT", "z_image"),
                    filter("Wan", "wan"),
                    filter("XL", "xl"),
                    filter("Pony", "pony"),
                ],
                image_size: ImageSize { min: 300, max: 1800, default: 900, step: 0.1 },
                paging: Paging { options: vec![50, 100, 250, 500], default: 100 },
                zoom: Zoom { default: 2.5 },
                debug_mode: false,
            },
            desktop: DesktopConfig { title: "Diffusion Darkroom".into(), width: 1600, height: 1000 },
            library: LibraryConfig {
                excluded_folders: vec!["samples".into()],
                icon_file: "ddr.png".into(),
                favorites_folder: "Favorites".into(),
            },
        }
    }
}

impl AppConfig {
    pub fn scan_rules(&self) -> ScanRules {
        ScanRules {
            excluded_folders: self.library.excluded_folders.iter().cloned().collect(),
            root_icon: self.library.icon_file.clone(),
        }
    }

    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(p) = patch.web { self.web.apply(p); }
        if let Some(p) = patch.desktop { self.desktop.apply(p); }
        if let Some(p) = patch.library { self.library.apply(p); }
    }
}

/// Overlay shape of `config.json`: objects recurse, everything else replaces.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigPatch {
    pub web: Option<WebPatch>,
    pub desktop: Option<DesktopPatch>,
    pub library: Option<LibraryPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebPatch {
    pub model_filters: Option<Vec<ModelFilter>>,
    pub image_size: Option<ImageSizePatch>,
    pub paging: Option<PagingPatch>,
    pub zoom: Option<ZoomPatch>,
    pub debug_mode: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSizePatch {
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub default: Option<u32>,
    pub step: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PagingPatch {
    pub options: Option<Vec<u32>>,
    pub default: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoomPatch {
    pub default: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesktopPatch {
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LibraryPatch {
    pub excluded_folders: Option<Vec<String>>,
    pub icon_file: Option<String>,
    pub favorites_folder: Option<String>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl WebConfig {
    fn apply(&mut self, p: WebPatch) {
        set(&mut self.model_filters, p.model_filters);
        if let Some(s) = p.image_size {
            set(&mut self.image_size.min, s.min);
            set(&mut self.image_size.max, s.max);
            set(&mut self.image_size.default, s.default);
            set(&mut self.image_size.step, s.step);
        }
        if let Some(pg) = p.paging {
            set(&mut self.paging.options, pg.options);
            set(&mut self.paging.default, pg.default);
        }
        if let Some(z) = p.zoom {
            set(&mut self.zoom.default, z.default);
        }
        set(&mut self.debug_mode, p.debug_mode);
    }
}

impl DesktopConfig {
    fn apply(&mut self, p: DesktopPatch) {
        set(&mut self.title, p.title);
        set(&mut self.width, p.width);
        set(&mut self.height, p.height);
    }
}

impl LibraryConfig {
    fn apply(&mut self, p: LibraryPatch) {
        set(&mut self.excluded_folders, p.excluded_folders);
        set(&mut self.icon_file, p.icon_file);
        set(&mut self.favorites_folder, p.favorites_folder);
    }
}

/// Result of probing the candidate list.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

/// Defaults overlaid with the first candidate that exists and parses.
/// Unparseable candidates are logged and skipped.
pub fn load(candidates: &[PathBuf]) -> LoadedConfig {
    let mut config = AppConfig::default();
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match read_patch(path) {
            Ok(patch) => {
                config.apply(patch);
                tracing::info!("DARKROOM: Loaded app config from {}", path.display());
                return LoadedConfig { config, source: Some(path.clone()) };
            }
            Err(e) => tracing::error!("Failed to read config.json at {}: {e:#}", path.display()),
        }
    }
    tracing::warn!("config.json not found. Using built-in defaults.");
    LoadedConfig { config, source: None }
}

fn read_patch(path: &Path) -> anyhow::Result<ConfigPatch> {
    use anyhow::Context;
    let text = fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;
    Ok(serde_json::from_str(&text).with_context(|| format!("parse {path:?}"))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_override_keeps_other_defaults() {
        let patch: ConfigPatch = serde_json::from_str(r#"{"web":{"debugMode":true}}"#).unwrap();
        let mut cfg = AppConfig::default();
        cfg.apply(patch);

        let mut expected = AppConfig::default();
        expected.web.debug_mode = true;
        assert_eq!(cfg, expected);
    }

    #[test]
    fn nested_objects_merge_key_by_key_and_arrays_replace() {
        let patch: ConfigPatch = serde_json::from_str(
            r#"{"web":{"imageSize":{"max":2400},"paging":{"options":[10,20]}},"desktop":{"title":"Lab"}}"#,
        )
        .unwrap();
        let mut cfg = AppConfig::default();
        cfg.apply(patch);
        assert_eq!(cfg.web.image_size.max, 2400);
        assert_eq!(cfg.web.image_size.min, 300);
        assert_eq!(cfg.web.paging.options, vec![10, 20]);
        assert_eq!(cfg.web.paging.default, 100);
        assert_eq!(cfg.desktop.title, "Lab");
        assert_eq!(cfg.desktop.width, 1600);
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        assert!(serde_json::from_str::<ConfigPatch>(r#"{"web":{"debugMod":true}}"#).is_err());
        assert!(serde_json::from_str::<ConfigPatch>(r#"{"extra":1}"#).is_err());
    }

    #[test]
    fn serializes_in_camel_case() {
        let v = serde_json::to_value(AppConfig::default()).unwrap();
        assert_eq!(v["web"]["debugMode"], false);
        assert_eq!(v["web"]["modelFilters"][2]["containsText"], "z_image");
        assert_eq!(v["web"]["imageSize"]["default"], 900);
    }

    #[test]
    fn broken_candidate_falls_through_to_next() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("bad.json");
        let good = tmp.path().join("good.json");
        fs::write(&bad, "{ nope").unwrap();
        fs::write(&good, r#"{"zoomy":1}"#).unwrap();
        let third = tmp.path().join("third.json");
        fs::write(&third, r#"{"web":{"zoom":{"default":4.0}}}"#).unwrap();

        let missing = tmp.path().join("missing.json");
        let loaded = load(&[missing, bad, good, third.clone()]);
        assert_eq!(loaded.source, Some(third));
        assert_eq!(loaded.config.web.zoom.default, 4.0);
    }

    #[test]
    fn no_candidates_means_defaults() {
        let loaded = load(&[]);
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config, AppConfig::default());
    }
}
