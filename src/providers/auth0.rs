use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MigrateError;
use crate::providers::classify_failure;

/// Current truth for one account in the source tenant, fetched at resolution
/// time via the users-by-email endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoritativeAccount {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub logins_count: Option<i64>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Seam for the authoritative re-query so the resolution engine can be
/// exercised without a live tenant.
#[async_trait]
pub trait AuthoritativeSource: Send + Sync {
    /// All accounts currently registered under `email`, keyed by provider id.
    async fn users_by_email(
        &self,
        email: &str,
    ) -> Result<HashMap<String, AuthoritativeAccount>, MigrateError>;
}

/// Auth0 Management API client.
/// Base: https://{tenant-domain}/api/v2/
///
/// Only the read surface this tool needs: users-by-email, used as the
/// authoritative source during duplicate resolution.
#[derive(Debug, Clone)]
pub struct Auth0Provider {
    base_url: String,
    http: Client,
    token: String,
}

impl Auth0Provider {
    pub fn new(base_url: &str, token: String, timeout_secs: Option<u64>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .user_agent("idp-migrate/0.1")
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(15)))
            .build()
            .context("failed to build auth0 http client")?;
        Ok(Self {
            base_url,
            http,
            token,
        })
    }
}

#[async_trait]
impl AuthoritativeSource for Auth0Provider {
    async fn users_by_email(
        &self,
        email: &str,
    ) -> Result<HashMap<String, AuthoritativeAccount>, MigrateError> {
        let url = format!(
            "{}/api/v2/users-by-email?email={}",
            self.base_url,
            urlencoding::encode(&email.to_lowercase())
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| MigrateError::Fatal(anyhow::anyhow!("auth0 users-by-email: {e}")))?;

        if !resp.status().is_success() {
            return Err(classify_failure("auth0", resp).await);
        }

        let accounts: Vec<AuthoritativeAccount> = resp
            .json()
            .await
            .map_err(|e| MigrateError::Fatal(anyhow::anyhow!("auth0 users-by-email body: {e}")))?;
        debug!(email, count = accounts.len(), "authoritative re-query");

        Ok(accounts
            .into_iter()
            .map(|a| (a.user_id.clone(), a))
            .collect())
    }
}
