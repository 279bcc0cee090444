//! The UI template carries one embedded list, `embeddedImageList = [...]`,
//! which the server can rewrite in place. Locating it is a delimiter scan
//! over the array literal, never a pattern search across the whole file.

use std::{ops::Range, path::{Path, PathBuf}};
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

pub const MARKER: &str = "embeddedImageList";
pub const EMPTY_PLACEHOLDER: &str = "const embeddedImageList = []; // Will be replaced with actual list";

/// Byte range covering `[ ... ];` of the marker assignment.
pub fn find_embedded_list(html: &str) -> Option<Range<usize>> {
    let mut from = 0;
    while let Some(pos) = html[from..].find(MARKER) {
        let after_name = from + pos + MARKER.len();
        if let Some(range) = list_after(html, after_name) {
            return Some(range);
        }
        from = after_name;
    }
    None
}

/// Expects `\s*=\s*[` at `start`, then scans to the matching `]` and a `;`.
fn list_after(html: &str, start: usize) -> Option<Range<usize>> {
    let bytes = html.as_bytes();
    let mut i = skip_ws(bytes, start);
    if bytes.get(i) != Some(&b'=') {
        return None;
    }
    i = skip_ws(bytes, i + 1);
    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    let open = i;

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        let semi = skip_ws(bytes, i + 1);
                        return (bytes.get(semi) == Some(&b';')).then(|| open..semi + 1);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
        i += 1;
    }
    i
}

/// Pretty JSON that is also safe inside a `<script>` element.
fn render_list(images: &[String]) -> AppResult<String> {
    let json = serde_json::to_string_pretty(images)?;
    Ok(json.replace("</", "<\\/"))
}

/// Swap the embedded list for `images`, leaving every other byte alone.
/// A first-run template with the empty placeholder line is also accepted.
pub fn replace_embedded_list(html: &str, images: &[String]) -> AppResult<String> {
    let list = render_list(images)?;
    if let Some(pos) = html.find(EMPTY_PLACEHOLDER) {
        let mut out = String::with_capacity(html.len() + list.len());
        out.push_str(&html[..pos]);
        out.push_str(&format!("const {MARKER} = {list};"));
        out.push_str(&html[pos + EMPTY_PLACEHOLDER.len()..]);
        return Ok(out);
    }
    let range = find_embedded_list(html).ok_or(AppError::MarkerNotFound)?;
    Ok(format!("{}{list};{}", &html[..range.start], &html[range.end..]))
}

/// The template file on disk. Reads and rewrites go through one lock so a
/// request never sees a half-written page.
pub struct TemplateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory static UI assets are served from.
    pub fn asset_dir(&self) -> Option<&Path> {
        self.path.parent()
    }

    pub async fn read(&self) -> AppResult<Vec<u8>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::TemplateMissing(self.path.clone())),
            Err(e) => Err(AppError::io("Failed to read HTML file", e)),
        }
    }

    /// Rewrite the embedded list; returns the number of entries written.
    pub async fn update_embedded_list(&self, images: &[String]) -> AppResult<usize> {
        let _guard = self.lock.lock().await;
        let html = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::TemplateMissing(self.path.clone()));
            }
            Err(e) => return Err(AppError::io("Failed to update HTML file", e)),
        };
        let updated = replace_embedded_list(&html, images)?;

        let tmp = self.path.with_extension("html.tmp");
        tokio::fs::write(&tmp, updated)
            .await
            .map_err(|e| AppError::io("Failed to update HTML file", e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::io("Failed to update HTML file", e));
        }
        tracing::info!(
            "DARKROOM: Updated embedded image list in {} with {} images",
            self.path.display(),
            images.len()
        );
        Ok(images.len())
    }
}
