mod activity;
mod config;
mod error;
mod indexer;
mod mutate;
mod paths;
mod roots;
mod runtime;
mod sandbox;
mod template;
mod web;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{path::{Path, PathBuf}, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, fmt::time::ChronoLocal, prelude::*, reload, EnvFilter};

use crate::roots::{NativePicker, RootSelector};
use crate::runtime::RuntimeStore;
use crate::template::TemplateStore;

const PORT_RANGE: std::ops::Range<u16> = 8000..8100;

#[derive(Parser, Debug)]
#[command(name = "darkroom", version, about = "Local image library server with sandboxed file moves", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the UI and library API on localhost
    Serve {
        #[arg(long, value_enum, default_value_t = Mode::Web)]
        mode: Mode,
        /// Fixed port; otherwise the first free port in 8000..8100
        #[arg(long)]
        port: Option<u16>,
        /// Library root, overriding the remembered one
        #[arg(long)]
        base_dir: Option<PathBuf>,
        #[arg(long)]
        template: Option<PathBuf>,
        /// Explicit config.json instead of the usual search
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        verbose: bool,
    },
    /// Rewrite the template's embedded image list from a library scan
    Inject {
        #[arg(long)]
        base_dir: Option<PathBuf>,
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Print the image index of a folder
    Scan { folder: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Also open the UI in the default browser
    Web,
    /// Serve only; a desktop shell loads the page
    Desktop,
}

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

fn init_logging() -> FilterHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_timer(ChronoLocal::new("%m.%d.%Y %I:%M%P".to_string())),
        )
        .init();
    handle
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_filter = init_logging();
    let app_dir = paths::app_dir();
    let cwd = std::env::current_dir().context("resolve current directory")?;

    match cli.command {
        Commands::Serve { mode, port, base_dir, template, config, verbose } => {
            let candidates = match config {
                Some(path) => vec![path],
                None => paths::config_candidates(&app_dir, &cwd),
            };
            let loaded = config::load(&candidates);
            if verbose || loaded.config.web.debug_mode {
                let _ = log_filter.modify(|f| *f = EnvFilter::new("debug"));
            }
            if let Some(source) = &loaded.source {
                tracing::debug!("config overlay: {}", source.display());
            }

            let template = paths::find_template(template.as_deref(), &app_dir, &cwd).with_context(|| {
                format!("UI template ddr.html not found (looked under {} and {})", app_dir.display(), cwd.display())
            })?;
            tracing::info!("DARKROOM: Using UI template {}", template.display());

            let roots = RootSelector::new(RuntimeStore::at_default_location()?);
            tracing::debug!("runtime state: {}", roots.store().path().display());
            roots.restore(base_dir.as_deref());

            let listener = bind(port).await?;
            let port = listener.local_addr()?.port();
            let state = Arc::new(web::AppState::new(
                loaded.config,
                roots,
                TemplateStore::new(template),
                Arc::new(NativePicker),
                app_dir,
            ));

            tracing::info!("DARKROOM: Server started on http://localhost:{port}");
            if mode == Mode::Web {
                let url = format!("http://localhost:{port}/ddr.html?v={}", chrono::Utc::now().timestamp());
                if let Err(e) = open::that(&url) {
                    tracing::warn!("Could not open browser ({e}); visit {url}");
                }
            }
            web::run_ui(state, listener).await?;
        }
        Commands::Inject { base_dir, template } => {
            let template = paths::find_template(template.as_deref(), &app_dir, &cwd)
                .context("UI template ddr.html not found")?;
            let root = match base_dir {
                Some(dir) => Some(dir),
                None => RuntimeStore::at_default_location()?.base_dir(),
            };
            let root = root.context("no library folder given and none remembered")?;
            let images = indexer::scan(Some(&root), &library_rules(&app_dir, &cwd))?;
            let store = TemplateStore::new(template);
            let count = store.update_embedded_list(&images).await?;
            println!("Injected {count} images into {}", store.path().display());
        }
        Commands::Scan { folder } => {
            let images = indexer::scan(Some(&folder), &library_rules(&app_dir, &cwd))?;
            for rel in &images {
                println!("{rel}");
            }
            eprintln!("{} images", images.len());
        }
    }
    Ok(())
}

/// Scan rules from the same `config.json` search `serve` uses.
fn library_rules(app_dir: &Path, cwd: &Path) -> indexer::ScanRules {
    config::load(&paths::config_candidates(app_dir, cwd)).config.scan_rules()
}

async fn bind(port: Option<u16>) -> Result<TcpListener> {
    if let Some(port) = port {
        return TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("bind 127.0.0.1:{port}"));
    }
    for port in PORT_RANGE {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            return Ok(listener);
        }
    }
    anyhow::bail!("no free port in {}..{}", PORT_RANGE.start, PORT_RANGE.end)
}
