use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::{any::Any, path::{Path, PathBuf}, sync::Arc};
use tower::ServiceExt;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeFile, trace::TraceLayer};

use crate::activity::ActionReport;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::indexer;
use crate::mutate::FileMutator;
use crate::roots::{FolderPicker, RootSelector};
use crate::sandbox;
use crate::template::TemplateStore;

pub struct AppState {
    pub config: AppConfig,
    pub roots: RootSelector,
    pub template: TemplateStore,
    pub mutator: FileMutator,
    pub picker: Arc<dyn FolderPicker>,
    /// Install directory: second source of static assets, and the static
    /// root while no library is selected.
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        roots: RootSelector,
        template: TemplateStore,
        picker: Arc<dyn FolderPicker>,
        app_dir: PathBuf,
    ) -> Self {
        let mutator = FileMutator::new(config.library.favorites_folder.clone());
        Self { config, roots, template, mutator, picker, app_dir }
    }

    fn base_folder(&self) -> Option<String> {
        self.roots.get_active().map(|p| p.to_string_lossy().into_owned())
    }

    /// Root for mutations; there is no fallback when nothing is selected.
    fn mutation_root(&self) -> AppResult<PathBuf> {
        self.roots
            .get_active()
            .ok_or_else(|| AppError::BadRequest("No image root folder selected".into()))
    }

    async fn scan(&self) -> AppResult<Vec<String>> {
        let root = self.roots.get_active();
        let rules = self.config.scan_rules();
        blocking(move || {
            indexer::scan(root.as_deref(), &rules)
                .map_err(|e| AppError::Internal(format!("Failed to rescan images: {e:#}")))
        })
        .await
    }
}

/// Filesystem work runs on the blocking pool, off the request workers.
async fn blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("Background task failed: {e}")))?
}

type Shared = Arc<AppState>;

const NO_CACHE: [(HeaderName, &str); 3] = [
    (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

pub fn router(state: Shared) -> Router {
    Router::new()
        .route("/", only(get(index)))
        .route("/app-config", only(get(app_config_json)))
        .route("/app-config.js", only(get(app_config_script)))
        .route("/rescan-images", only(get(rescan_images)))
        .route("/current-base-folder", only(get(current_base_folder)))
        .route("/log-action", only(post(log_action)))
        .route("/move-file", only(post(move_file)))
        .route("/delete-file", only(post(delete_file)))
        .route("/select-base-folder", only(post(select_base_folder)))
        .route(
            "/update-embedded-list",
            only(post(update_embedded_list)).layer(DefaultBodyLimit::disable()),
        )
        .fallback(static_or_not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wrong method on a known path is a plain 404, same as an unknown path.
fn only(route: MethodRouter<Shared>) -> MethodRouter<Shared> {
    route.fallback(not_found)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

pub async fn run_ui(state: Shared, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("DARKROOM: Shutting down server...");
        })
        .await?;
    tracing::info!("DARKROOM: Server stopped.");
    Ok(())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Unexpected error in request handler: {detail}");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": format!("Server error: {detail}") }))).into_response()
}

fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

// ---- UI template and config -------------------------------------------------

async fn index(State(s): State<Shared>) -> AppResult<Response> {
    serve_template(&s).await
}

async fn serve_template(s: &AppState) -> AppResult<Response> {
    let html = s.template.read().await?;
    Ok((NO_CACHE, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response())
}

async fn app_config_json(State(s): State<Shared>) -> AppResult<Response> {
    let body = serde_json::to_string(&s.config)?;
    Ok((NO_CACHE, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn app_config_script(State(s): State<Shared>) -> AppResult<Response> {
    let body = format!("window.__DDR_APP_CONFIG__ = {};", serde_json::to_string(&s.config)?);
    Ok((NO_CACHE, [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")], body).into_response())
}

// ---- library index ----------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanResp {
    images: Vec<String>,
    count: usize,
    base_folder: Option<String>,
}

async fn rescan_images(State(s): State<Shared>) -> AppResult<Response> {
    let images = s.scan().await?;
    tracing::info!("DARKROOM: Images Folders Re-Scanned and Loaded: {} images", images.len());
    let resp = ScanResp { count: images.len(), images, base_folder: s.base_folder() };
    Ok((NO_CACHE, Json(resp)).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BaseFolderResp {
    base_folder: Option<String>,
    is_selected: bool,
}

async fn current_base_folder(State(s): State<Shared>) -> Json<BaseFolderResp> {
    let base_folder = s.base_folder();
    Json(BaseFolderResp { is_selected: base_folder.is_some(), base_folder })
}

#[derive(Default, Deserialize)]
struct SelectReq {
    #[serde(default)]
    folder: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectResp {
    selected: bool,
    base_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

async fn select_base_folder(State(s): State<Shared>, body: Bytes) -> AppResult<Json<SelectResp>> {
    let req: SelectReq = parse_body(&body)?;
    let requested = req.folder.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());

    let chosen = match requested {
        Some(folder) => Some(folder),
        None => pick_folder(&s).await,
    };
    let Some(chosen) = chosen else {
        return Ok(Json(SelectResp { selected: false, base_folder: s.base_folder(), images: None, count: None }));
    };

    s.roots.set_active(Some(&chosen), true)?;
    let images = s.scan().await?;
    let base_folder = s.base_folder();
    tracing::info!("DARKROOM: Base folder selected: {}", base_folder.as_deref().unwrap_or_default());
    Ok(Json(SelectResp { selected: true, base_folder, count: Some(images.len()), images: Some(images) }))
}

/// Cancelled and unavailable dialogs both come back as `None`.
async fn pick_folder(s: &Shared) -> Option<String> {
    let picker = s.picker.clone();
    let initial = s.roots.get_active().unwrap_or_else(|| s.app_dir.clone());
    match tokio::task::spawn_blocking(move || picker.pick_folder(Some(&initial))).await {
        Ok(Ok(picked)) => picked.map(|p| p.to_string_lossy().into_owned()),
        Ok(Err(msg)) => {
            tracing::warn!("{msg}");
            None
        }
        Err(e) => {
            tracing::error!("Folder picker failed: {e}");
            None
        }
    }
}

// ---- client activity --------------------------------------------------------

async fn log_action(body: Bytes) -> AppResult<Json<serde_json::Value>> {
    let report: ActionReport = serde_json::from_slice(&body)
        .map_err(|e| AppError::Internal(format!("Failed to process log action: {e}")))?;
    tracing::info!("{}", report.log_line());
    Ok(Json(json!({ "success": true })))
}

// ---- mutations --------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveReq {
    #[serde(default)]
    old_path: String,
    #[serde(default)]
    new_path: String,
}

async fn move_file(State(s): State<Shared>, body: Bytes) -> AppResult<Json<serde_json::Value>> {
    let req: MoveReq = parse_body(&body)?;
    if req.old_path.is_empty() || req.new_path.is_empty() {
        return Err(AppError::BadRequest("Missing oldPath or newPath".into()));
    }
    let root = s.mutation_root()?;
    let mutator = s.mutator.clone();
    blocking(move || mutator.move_file(&root, &req.old_path, &req.new_path)).await?;
    Ok(Json(json!({ "success": true, "message": "File moved successfully" })))
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteReq {
    #[serde(default)]
    file_path: String,
}

async fn delete_file(State(s): State<Shared>, body: Bytes) -> AppResult<Json<serde_json::Value>> {
    let req: DeleteReq = parse_body(&body)?;
    if req.file_path.is_empty() {
        return Err(AppError::BadRequest("Missing filePath".into()));
    }
    let root = s.mutation_root()?;
    let mutator = s.mutator.clone();
    blocking(move || mutator.delete_file(&root, &req.file_path)).await?;
    Ok(Json(json!({ "success": true, "message": "File deleted successfully" })))
}

#[derive(Default, Deserialize)]
struct EmbedReq {
    #[serde(default)]
    images: Option<Vec<String>>,
}

/// Body is `{"images": [..]}` with string entries. A body without `images`
/// is rejected with 400 rather than treated as an empty list, so a client
/// bug cannot silently wipe the embedded list. The whole library can be
/// posted at once, so this route has no body size limit.
async fn update_embedded_list(State(s): State<Shared>, body: Bytes) -> AppResult<Json<serde_json::Value>> {
    let req: EmbedReq = parse_body(&body)
        .map_err(|_| AppError::BadRequest("Missing or invalid images array".into()))?;
    let images = req.images.ok_or_else(|| AppError::BadRequest("Missing or invalid images array".into()))?;
    let count = s.template.update_embedded_list(&images).await?;
    Ok(Json(json!({ "success": true, "count": count })))
}

// ---- static files -----------------------------------------------------------

async fn static_or_not_found(State(s): State<Shared>, req: Request) -> Response {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = sandbox::decode_request_path(req.uri().path());
    if path.ends_with(".html") {
        return serve_template(&s).await.into_response();
    }
    let mut asset_bases: Vec<PathBuf> = Vec::new();
    if let Some(dir) = s.template.asset_dir() {
        asset_bases.push(dir.to_path_buf());
    }
    asset_bases.push(s.app_dir.clone());
    asset_bases.push(s.app_dir.join("app-web"));
    asset_bases.push(s.app_dir.join("web-app"));
    let root = s.roots.get_active().unwrap_or_else(|| s.app_dir.clone());

    match blocking(move || locate_static(&asset_bases, &root, &path)).await {
        Ok(file) => serve_file(file, req).await,
        Err(e) => e.into_response(),
    }
}

/// UI assets first, then the library (or install dir when none is selected).
/// Every base goes through the sandbox.
fn locate_static(asset_bases: &[PathBuf], root: &Path, path: &str) -> AppResult<PathBuf> {
    for base in asset_bases {
        if let Ok(candidate) = sandbox::resolve(path, base) {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    let candidate = sandbox::resolve(path, root)?;
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(AppError::NotFound { what: "File", path: path.trim_start_matches('/').to_string() })
    }
}

async fn serve_file(file: PathBuf, req: Request) -> Response {
    match ServeFile::new(&file).oneshot(req).await {
        Ok(resp) => resp.map(Body::new),
        Err(never) => match never {},
    }
}
