//! Session persistence for the CLI
//!
//! The current session lives in one JSON file. Dashboard commands refuse to
//! run without a live session; `login` refuses to run with one.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tuneboard_common::auth::Session;

pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored session, if any and still live
    pub async fn load(&self) -> Result<Option<Session>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                return Ok(None);
            }
        };

        Ok(Some(session).filter(Session::is_live))
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing {}", self.path.display()))
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// A live session or the "go log in" error
    pub async fn require(&self) -> Result<Session> {
        match self.load().await? {
            Some(session) => Ok(session),
            None => bail!("Not signed in. Run `tuneboard login` first."),
        }
    }
}
