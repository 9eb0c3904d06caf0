//! Auth Provider client
//!
//! Provides:
//! - Credential validation done before any request
//! - Password sign-in with a single retry on rate limiting
//! - Sign-up, user lookup and sign-out against a GoTrue-style API

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::metrics::RequestMetrics;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Minimum password length accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Expiry as a Unix timestamp
    #[serde(default)]
    pub expires_at: Option<i64>,

    pub user: AuthUser,
}

impl Session {
    /// Check if the session can still be used
    pub fn is_live(&self) -> bool {
        self.expires_at
            .map(|expires_at| expires_at > Utc::now().timestamp())
            .unwrap_or(true)
    }

    fn from_response(value: Value) -> Result<Self> {
        let expires_in = value.get("expires_in").and_then(Value::as_i64);
        let mut session: Session = serde_json::from_value(value)?;
        if session.expires_at.is_none() {
            session.expires_at = expires_in.map(|secs| Utc::now().timestamp() + secs);
        }
        Ok(session)
    }
}

/// Result of a sign-up
#[derive(Debug, Clone, PartialEq)]
pub enum SignUp {
    /// Account created and signed in
    SignedIn(Session),
    /// Account created; the address must be confirmed first
    ConfirmationSent { email: String },
}

/// Trait for the Auth Provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp>;

    /// Resolve the user behind an access token
    async fn user(&self, access_token: &str) -> Result<AuthUser>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

/// Trimmed sign-in credentials; both must be present
pub fn validate_credentials(email: &str, password: &str) -> Result<(String, String)> {
    let email = email.trim();
    let password = password.trim();

    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation {
            message: "Email and password are required".to_string(),
        });
    }
    Ok((email.to_string(), password.to_string()))
}

/// Sign-up form rules
pub fn validate_sign_up(email: &str, password: &str, confirm_password: &str) -> Result<()> {
    let invalid = |message: &str| {
        Err(AppError::Validation {
            message: message.to_string(),
        })
    };

    if email.is_empty() || password.is_empty() || confirm_password.is_empty() {
        return invalid("All fields are required");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return invalid("Password must be at least 6 characters long");
    }
    if password != confirm_password {
        return invalid("Passwords do not match");
    }

    let valid_email = regex_lite::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
        .map(|re| re.is_match(email))
        .unwrap_or(false);
    if !valid_email {
        return invalid("Please enter a valid email address");
    }
    Ok(())
}

/// Detect a transient rate limit from status and message
pub fn is_rate_limited(status: u16, message: &str) -> bool {
    if status == 429 {
        return true;
    }
    regex_lite::Regex::new(r"(?i)rate\s*limit")
        .map(|re| re.is_match(message))
        .unwrap_or(false)
}

/// GoTrue REST client
pub struct GoTrueAuth {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limit_retry: Duration,
}

impl GoTrueAuth {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        rate_limit_retry: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limit_retry,
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let url = config.auth_url().ok_or_else(|| AppError::Configuration {
            message: "auth.url (or store.url) must be set".to_string(),
        })?;
        let api_key = config.auth_api_key().ok_or_else(|| AppError::Configuration {
            message: "auth.api_key (or store.api_key) must be set".to_string(),
        })?;

        Self::new(
            url,
            api_key,
            Duration::from_millis(config.auth.rate_limit_retry_ms),
            config.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value> {
        let metrics = RequestMetrics::start("auth", operation);
        let response = match request.header("apikey", &self.api_key).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics.finish(false);
                return Err(AppError::HttpClient(e));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        metrics.finish(status.is_success());

        if status.is_success() {
            return Ok(value);
        }

        let message = auth_error_message(&value)
            .unwrap_or_else(|| format!("{} failed with status {}", operation, status.as_u16()));

        if is_rate_limited(status.as_u16(), &message) {
            return Err(AppError::RateLimited { message });
        }
        Err(AppError::Unauthorized { message })
    }

    async fn password_grant(&self, email: &str, password: &str) -> Result<Session> {
        let request = self
            .client
            .post(self.url("/token"))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));

        let value = self.send("sign_in", request).await?;
        if value.get("user").map_or(true, Value::is_null) {
            return Err(AppError::Unauthorized {
                message: "Login failed - no user returned".to_string(),
            });
        }
        Session::from_response(value)
    }
}

#[async_trait]
impl AuthProvider for GoTrueAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let (email, password) = validate_credentials(email, password)?;

        let session = match self.password_grant(&email, &password).await {
            Err(AppError::RateLimited { message }) => {
                warn!(
                    retry_ms = self.rate_limit_retry.as_millis() as u64,
                    %message,
                    "Rate limit hit, retrying sign-in"
                );
                tokio::time::sleep(self.rate_limit_retry).await;
                self.password_grant(&email, &password).await?
            }
            other => other?,
        };

        info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        let (email, password) = validate_credentials(email, password)?;
        let request = self
            .client
            .post(self.url("/signup"))
            .json(&json!({ "email": email, "password": password }));

        let value = self.send("sign_up", request).await?;
        if value.get("access_token").and_then(Value::as_str).is_some() {
            return Session::from_response(value).map(SignUp::SignedIn);
        }
        Ok(SignUp::ConfirmationSent { email })
    }

    async fn user(&self, access_token: &str) -> Result<AuthUser> {
        let request = self.client.get(self.url("/user")).bearer_auth(access_token);
        let value = self.send("user", request).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let request = self.client.post(self.url("/logout")).bearer_auth(access_token);
        self.send("sign_out", request).await.map(|_| ())
    }
}

fn auth_error_message(value: &Value) -> Option<String> {
    ["error_description", "msg", "message", "error"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_trimmed_and_required() {
        let (email, password) = validate_credentials("  a@b.io ", " secret ").unwrap();
        assert_eq!(email, "a@b.io");
        assert_eq!(password, "secret");

        let err = validate_credentials("a@b.io", "   ").unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: Email and password are required");
    }

    #[test]
    fn test_sign_up_rules() {
        assert!(validate_sign_up("a@b.io", "secret1", "secret1").is_ok());

        let cases = [
            ("", "secret1", "secret1", "All fields are required"),
            ("a@b.io", "abc", "abc", "at least 6 characters"),
            ("a@b.io", "secret1", "secret2", "do not match"),
            ("not-an-email", "secret1", "secret1", "valid email"),
        ];
        for (email, password, confirm, expected) in cases {
            let err = validate_sign_up(email, password, confirm).unwrap_err();
            assert!(err.to_string().contains(expected), "{}", err);
        }
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited(429, ""));
        assert!(is_rate_limited(400, "Request rate limit reached"));
        assert!(is_rate_limited(400, "RATELIMIT exceeded"));
        assert!(!is_rate_limited(400, "Invalid login credentials"));
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session::from_response(json!({
            "access_token": "jwt",
            "refresh_token": "r",
            "expires_in": 3600,
            "user": {"id": "u1", "email": "a@b.io"}
        }))
        .unwrap();
        assert!(session.is_live());

        session.expires_at = Some(Utc::now().timestamp() - 1);
        assert!(!session.is_live());
    }

    #[test]
    fn test_auth_error_message() {
        assert_eq!(
            auth_error_message(&json!({"error": "invalid_grant", "error_description": "Invalid login credentials"}))
                .as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(auth_error_message(&json!({"msg": "Email not confirmed"})).as_deref(), Some("Email not confirmed"));
        assert_eq!(auth_error_message(&Value::Null), None);
    }
}
