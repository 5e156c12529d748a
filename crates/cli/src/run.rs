use std::sync::Arc;

use anyhow::Result;
use dominds_core::auth::{AuthGate, RunMode};
use dominds_core::config::RuntimeConfig;
use dominds_core::runtime::Runtime;
use dominds_core::server::{self, AppState};
use dominds_core::store::FsEventStore;

use crate::args::CliArgs;

/// Applies CLI overrides on top of the file-loaded config, then starts the
/// WebSocket server and blocks until shutdown.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = RuntimeConfig::load(&args.config).await?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }

    let workspace_root = config.resolved_workspace_root(
        &args
            .workspace_root
            .unwrap_or_else(|| std::env::current_dir().expect("current dir is readable")),
    );
    tracing::info!(root = %workspace_root.display(), "resolved workspace root");

    let run_mode: RunMode = config.mode.into();
    let auth = AuthGate::resolve(run_mode, config.auth_key.as_deref());
    if let AuthGate::Enabled { key } = &auth {
        tracing::warn!(%key, "auth key generated for this run — share it with dashboard clients");
    }

    let store = Arc::new(FsEventStore::new(workspace_root));
    let runtime = Arc::new(Runtime::new(store));

    let state = AppState {
        runtime,
        auth: Arc::new(auth),
        server_work_language: config.ui_language.clone(),
        supported_language_codes: vec![config.ui_language],
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "control protocol listening");
    axum::serve(listener, server::router(state)).await?;
    Ok(())
}
