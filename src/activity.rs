use serde::Deserialize;
use serde_json::{Map, Value};

const DETAIL_SEP: &str = " \u{1F892} ";

/// Client-side event reported through `/log-action`.
#[derive(Debug, Default, Deserialize)]
pub struct ActionReport {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub details: Value,
}

fn display_name(action: &str) -> String {
    let mapped = match action {
        "metadata_fetch_start" | "metadata_background_start" => "Metadata Processing",
        "metadata_fetch_complete" => "Metadata Loaded",
        "page_size_change" => "Page Size Change",
        "size_change" => "Image Size Change",
        "favorites_filter" => "Favorites Filter",
        "model_filter" | "model_filter_result" => "Model Filter",
        "reload_complete" => "Images Folders Re-Scanned and Loaded",
        "filter_applied" => "Filter Applied",
        "sort" => "Sort",
        "page_change" => "Page Change",
        other => return title_case(&other.replace('_', " ")),
    };
    mapped.to_string()
}

fn is_library_event(action: &str) -> bool {
    matches!(
        action,
        "metadata_fetch_start" | "metadata_fetch_complete" | "metadata_background_start" | "reload_complete"
    )
}

/// Upper-cases the first letter of every run of letters, lower-cases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Scalars print the way the activity log has always shown them:
/// `True`/`False` and `None` rather than JSON spellings.
fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

fn render_details(details: &Map<String, Value>) -> String {
    details
        .iter()
        .map(|(k, v)| format!("{} = {}", title_case(&k.replace('_', " ")), render_value(v)))
        .collect::<Vec<_>>()
        .join(DETAIL_SEP)
}

impl ActionReport {
    /// One operator log line, e.g.
    /// `UI CHANGE: Page Size Change 🢒 Old Size = 50 🢒 New Size = 100`.
    pub fn log_line(&self) -> String {
        let action = self.action.as_deref().unwrap_or("unknown");
        let prefix = if is_library_event(action) { "DARKROOM: " } else { "UI CHANGE: " };
        let name = display_name(action);
        let details = self.details.as_object().map(render_details).unwrap_or_default();
        if details.is_empty() {
            format!("{prefix}{name}")
        } else {
            format!("{prefix}{name}{DETAIL_SEP}{details}")
        }
    }
}
