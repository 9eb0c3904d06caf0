//! Training, testing and download commands

use super::Workspace;
use crate::render;
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;
use tuneboard_reconciler::StartOutcome;

pub async fn train(workspace: &Workspace, selector: &str, watch: bool) -> Result<()> {
    workspace.load().await?;
    let document = workspace.find(selector).await?;
    let file_id = document.id.clone();

    let view = match workspace.dashboard.start_training(document).await? {
        StartOutcome::AlreadyTrained => return Ok(()),
        StartOutcome::Started(view) | StartOutcome::InProgress(view) => view,
    };
    println!("{}", view.status_label());

    if !watch {
        return Ok(());
    }

    let reconciler = workspace.dashboard.reconciler();
    let mut ticker = tokio::time::interval(workspace.config.polling.interval());
    let mut last = view.status_label();
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopped watching; training continues on the backend");
                return Ok(());
            }
        }

        let Some(view) = reconciler.view(file_id.as_str()).await? else {
            println!("Document is gone.");
            return Ok(());
        };

        let label = view.status_label();
        if label != last {
            println!("{}", label);
            last = label;
        }
        if !view.is_training {
            return Ok(());
        }
    }
}

pub async fn test(workspace: &Workspace, selector: &str, question: &str) -> Result<()> {
    workspace.load().await?;
    let document = workspace.find(selector).await?;
    let answer = workspace.dashboard.test_model(&document.id, question).await?;
    println!("{}", answer);
    Ok(())
}

pub async fn download(workspace: &Workspace, selector: &str, out: Option<PathBuf>) -> Result<()> {
    workspace.load().await?;
    let document = workspace.find(selector).await?;
    let dir = out.unwrap_or_else(|| workspace.config.backend.download_dir.clone());

    let path = workspace.dashboard.download_model(&document.id, &dir).await?;
    println!("{}", path.display());
    Ok(())
}

/// Keep the dashboard live until interrupted, reprinting it on every change
pub async fn watch(workspace: &Workspace) -> Result<()> {
    workspace.load().await?;
    let reconciler = workspace.dashboard.reconciler();

    let mut ticker = tokio::time::interval(workspace.config.polling.interval());
    let mut last = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }

        let rows = reconciler.snapshot().await?;
        if last.as_ref() != Some(&rows) {
            render::print_rows(&rows);
            println!();
            last = Some(rows);
        }
    }
}
