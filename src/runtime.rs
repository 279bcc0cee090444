use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::{fs, path::{Path, PathBuf}};

const BASE_DIR_KEY: &str = "base_dir";

/// The persisted runtime record (`ddr-runtime.json`). Holds the last selected
/// library root; other keys written by older builds are carried through.
#[derive(Debug, Clone)]
pub struct RuntimeStore {
    path: PathBuf,
}

impl RuntimeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_location() -> Result<Self> {
        Ok(Self::new(crate::paths::state_dir()?.join("ddr-runtime.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable, or non-object files all read as empty.
    pub fn load(&self) -> Map<String, Value> {
        let Ok(data) = fs::read(&self.path) else { return Map::new() };
        match serde_json::from_slice(&data) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn save(&self, record: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
        }
        let data = serde_json::to_vec_pretty(record)?;
        fs::write(&self.path, data).with_context(|| format!("write {:?}", self.path))
    }

    pub fn base_dir(&self) -> Option<PathBuf> {
        self.load()
            .get(BASE_DIR_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }

    /// `None` removes the key rather than writing an empty value.
    pub fn set_base_dir(&self, dir: Option<&Path>) -> Result<()> {
        let mut record = self.load();
        match dir {
            Some(d) => {
                record.insert(BASE_DIR_KEY.into(), Value::String(d.to_string_lossy().into_owned()));
            }
            None => {
                record.remove(BASE_DIR_KEY);
            }
        }
        self.save(&record)
    }
}
