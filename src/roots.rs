use std::{path::{Path, PathBuf}, sync::RwLock};

use crate::error::{AppError, AppResult};
use crate::runtime::RuntimeStore;

/// Native folder chooser. Whatever it returns is validated like any other
/// caller-supplied path.
pub trait FolderPicker: Send + Sync {
    /// `Err` means no dialog could be shown; `Ok(None)` means the user cancelled.
    fn pick_folder(&self, initial_dir: Option<&Path>) -> Result<Option<PathBuf>, String>;
}

/// OS dialog via `rfd`.
pub struct NativePicker;

impl FolderPicker for NativePicker {
    fn pick_folder(&self, initial_dir: Option<&Path>) -> Result<Option<PathBuf>, String> {
        let mut dialog = rfd::FileDialog::new().set_title("Select image root folder for Diffusion Darkroom");
        if let Some(dir) = initial_dir {
            dialog = dialog.set_directory(dir);
        }
        Ok(dialog.pick_folder())
    }
}

/// Used where no desktop session is available.
pub struct NoPicker;

impl FolderPicker for NoPicker {
    fn pick_folder(&self, _initial_dir: Option<&Path>) -> Result<Option<PathBuf>, String> {
        Err("Folder picker unavailable on this runtime".to_string())
    }
}

/// Sole owner of the active library root.
pub struct RootSelector {
    active: RwLock<Option<PathBuf>>,
    store: RuntimeStore,
}

impl RootSelector {
    pub fn new(store: RuntimeStore) -> Self {
        Self { active: RwLock::new(None), store }
    }

    pub fn store(&self) -> &RuntimeStore {
        &self.store
    }

    pub fn get_active(&self) -> Option<PathBuf> {
        self.active.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// An empty or absent `path` clears the root (and the persisted key when
    /// `persist`). Otherwise the path must name an existing directory; its
    /// canonical form becomes the active root.
    pub fn set_active(&self, path: Option<&str>, persist: bool) -> AppResult<Option<PathBuf>> {
        let requested = path.map(str::trim).filter(|p| !p.is_empty());
        let Some(requested) = requested else {
            self.replace(None);
            if persist {
                self.persist(None);
            }
            return Ok(None);
        };

        let canonical = dunce_canonical(Path::new(requested))
            .filter(|p| p.is_dir())
            .ok_or_else(|| AppError::InvalidRoot(std::path::absolute(requested).unwrap_or_else(|_| PathBuf::from(requested))))?;

        self.replace(Some(canonical.clone()));
        if persist {
            self.persist(Some(&canonical));
        }
        Ok(Some(canonical))
    }

    /// Startup path: the CLI override wins, then the persisted value. A stale
    /// value clears the root for this run only.
    pub fn restore(&self, cli_override: Option<&Path>) {
        let initial = cli_override.map(Path::to_path_buf).or_else(|| self.store.base_dir());
        let Some(initial) = initial else {
            tracing::info!("DARKROOM: No image root folder selected yet");
            return;
        };
        match self.set_active(Some(&initial.to_string_lossy()), true) {
            Ok(Some(root)) => tracing::info!("DARKROOM: Active image root folder: {}", root.display()),
            Ok(None) => tracing::info!("DARKROOM: No image root folder selected yet"),
            Err(e) => {
                tracing::warn!("Could not set initial base folder: {e}");
                let _ = self.set_active(None, false);
            }
        }
    }

    fn replace(&self, value: Option<PathBuf>) {
        *self.active.write().unwrap_or_else(|p| p.into_inner()) = value;
    }

    fn persist(&self, value: Option<&Path>) {
        if let Err(e) = self.store.set_base_dir(value) {
            tracing::error!("Failed to save runtime config: {e:#}");
        }
    }
}

/// `canonicalize` without the `\\?\` verbatim prefix on Windows, so the
/// stored root stays readable and prefix comparisons stay consistent.
fn dunce_canonical(p: &Path) -> Option<PathBuf> {
    let c = p.canonicalize().ok()?;
    #[cfg(windows)]
    {
        let s = c.to_string_lossy();
        if let Some(rest) = s.strip_prefix(r"\\?\") {
            if !rest.starts_with("UNC\\") {
                return Some(PathBuf::from(rest));
            }
        }
    }
    Some(c)
}
