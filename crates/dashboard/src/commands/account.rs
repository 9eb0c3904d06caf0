//! Sign-in, sign-up and session commands

use super::auth_client;
use crate::session::SessionFile;
use anyhow::{bail, Result};
use tracing::info;
use tuneboard_common::auth::{validate_credentials, validate_sign_up, SignUp};
use tuneboard_common::config::AppConfig;
use tuneboard_common::AuthProvider;

pub async fn login(config: &AppConfig, email: &str, password: &str) -> Result<()> {
    let sessions = SessionFile::new(&config.auth.session_file);
    if let Some(session) = sessions.load().await? {
        let who = session.user.email.as_deref().unwrap_or(&session.user.id);
        bail!("Already signed in as {}. Run `tuneboard logout` first.", who);
    }

    let (email, password) = validate_credentials(email, password)?;
    let auth = auth_client(config)?;
    let session = auth.sign_in(&email, &password).await?;
    sessions.save(&session).await?;

    info!(user_id = %session.user.id, "Signed in");
    println!("Signed in as {}", session.user.email.as_deref().unwrap_or(&email));
    Ok(())
}

pub async fn signup(config: &AppConfig, email: &str, password: &str, confirm_password: &str) -> Result<()> {
    validate_sign_up(email, password, confirm_password)?;
    let auth = auth_client(config)?;

    match auth.sign_up(email.trim(), password).await? {
        SignUp::SignedIn(session) => {
            SessionFile::new(&config.auth.session_file).save(&session).await?;
            println!("Account created. Signed in as {}", email.trim());
        }
        SignUp::ConfirmationSent { email } => {
            println!("Check {} for a confirmation link, then run `tuneboard login`.", email);
        }
    }
    Ok(())
}

pub async fn logout(config: &AppConfig) -> Result<()> {
    let sessions = SessionFile::new(&config.auth.session_file);
    let Some(session) = sessions.load().await? else {
        sessions.clear().await?;
        println!("Not signed in.");
        return Ok(());
    };

    // The local session goes regardless of what the provider says
    if let Err(e) = auth_client(config)?.sign_out(&session.access_token).await {
        tracing::warn!(error = %e, "Remote sign-out failed");
    }
    sessions.clear().await?;
    println!("Signed out.");
    Ok(())
}

pub async fn whoami(config: &AppConfig) -> Result<()> {
    let session = SessionFile::new(&config.auth.session_file).require().await?;
    let user = auth_client(config)?.user(&session.access_token).await?;
    println!("{} ({})", user.email.as_deref().unwrap_or("-"), user.id);
    Ok(())
}
