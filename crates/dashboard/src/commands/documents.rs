//! Document list, upload, delete and dataset commands

use super::Workspace;
use crate::render;
use anyhow::Result;
use std::path::PathBuf;
use tuneboard_reconciler::DatasetOutcome;

pub async fn list(workspace: &Workspace, json: bool) -> Result<()> {
    workspace.load().await?;
    let rows = workspace.dashboard.reconciler().snapshot().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        render::print_rows(&rows);
    }
    Ok(())
}

pub async fn upload(workspace: &Workspace, paths: &[PathBuf]) -> Result<()> {
    let summary = workspace.dashboard.upload_files(paths).await?;
    workspace.dashboard.reconciler().quiesce().await?;

    for name in &summary.uploaded {
        println!("uploaded  {}", name);
    }
    for (name, reason) in &summary.failed {
        println!("failed    {} ({})", name, reason);
    }
    Ok(())
}

pub async fn delete(workspace: &Workspace, selector: &str) -> Result<()> {
    workspace.load().await?;
    let document = workspace.find(selector).await?;
    workspace.dashboard.delete_document(&document).await?;
    workspace.dashboard.reconciler().quiesce().await?;
    Ok(())
}

pub async fn dataset(workspace: &Workspace, selector: &str) -> Result<()> {
    workspace.load().await?;
    let document = workspace.find(selector).await?;

    match workspace.dashboard.create_dataset(&document).await? {
        DatasetOutcome::Created { records } => println!("{} records generated", records),
        DatasetOutcome::AlreadyExists | DatasetOutcome::GeneratedNotSaved => {}
    }
    workspace.dashboard.reconciler().quiesce().await?;
    Ok(())
}
