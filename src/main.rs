mod config;
mod curriculum;
mod db;
mod directory;
mod error;
mod form;
mod gateway;
mod ipc;

use anyhow::Context;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::curriculum::CurriculumTree;

fn init_logging(config: &Config) {
    // stdout carries the IPC responses, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn load_curriculum(config: &Config) -> anyhow::Result<CurriculumTree> {
    match &config.curriculum_path {
        Some(path) => CurriculumTree::load(path)
            .with_context(|| format!("loading curriculum from {}", path.display())),
        None => CurriculumTree::builtin().context("loading built-in curriculum"),
    }
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_logging(&config);

    let curriculum = load_curriculum(&config).map_err(|e| {
        tracing::error!("{e:#}");
        e
    })?;
    tracing::info!(
        languages = ?curriculum.languages(),
        default_language = %config.default_language,
        "curriculum loaded"
    );

    let mut state = ipc::AppState::new(Arc::new(curriculum), config.default_language.clone());
    if let Some(workspace) = &config.workspace {
        state
            .open_workspace(workspace)
            .with_context(|| format!("opening workspace {}", workspace.display()))?;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!("unparseable request: {e}");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed, exiting");
    Ok(())
}
