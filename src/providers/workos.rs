use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::MigrateError;
use crate::providers::classify_failure;

/// A user as returned by the WorkOS User Management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkosUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Create payload. `metadata` carries the back-reference to the source
/// identifier so target accounts stay traceable to their origin.
#[derive(Debug, Clone, Serialize)]
pub struct CreateUser {
    pub email: String,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Update payload. Every field optional: absent fields are left untouched
/// downstream, which is what the merge semantics of the update branch need.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Seam for the target identity service so the migration worker can be
/// exercised against a fake directory in tests.
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<WorkosUser, MigrateError>;
    async fn create_user(&self, req: &CreateUser) -> Result<WorkosUser, MigrateError>;
    async fn update_user(&self, id: &str, req: &UpdateUser) -> Result<WorkosUser, MigrateError>;
    /// All users whose email matches exactly (lowercased upstream).
    async fn find_by_email(&self, email: &str) -> Result<Vec<WorkosUser>, MigrateError>;
}

/// WorkOS User Management API client.
/// Base: https://api.workos.com/user_management/
#[derive(Debug, Clone)]
pub struct WorkosProvider {
    base_url: String,
    http: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct UserList {
    data: Vec<WorkosUser>,
}

impl WorkosProvider {
    pub fn new(base_url: Option<&str>, api_key: String, timeout_secs: Option<u64>) -> Result<Self> {
        let base_url = base_url
            .unwrap_or("https://api.workos.com")
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .user_agent("idp-migrate/0.1")
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(15)))
            .build()
            .context("failed to build workos http client")?;
        Ok(Self {
            base_url,
            http,
            api_key,
        })
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        what: &'static str,
    ) -> Result<T, MigrateError> {
        let resp = req
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| MigrateError::Fatal(anyhow::anyhow!("workos {what}: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_failure("workos", resp).await);
        }
        resp.json::<T>()
            .await
            .map_err(|e| MigrateError::Fatal(anyhow::anyhow!("workos {what} body: {e}")))
    }
}

#[async_trait]
impl TargetDirectory for WorkosProvider {
    async fn get_user(&self, id: &str) -> Result<WorkosUser, MigrateError> {
        let url = format!("{}/user_management/users/{id}", self.base_url);
        self.send_json(self.http.get(&url), "get user").await
    }

    async fn create_user(&self, req: &CreateUser) -> Result<WorkosUser, MigrateError> {
        let url = format!("{}/user_management/users", self.base_url);
        debug!(email = %req.email, "creating target user");
        self.send_json(self.http.post(&url).json(req), "create user")
            .await
    }

    async fn update_user(&self, id: &str, req: &UpdateUser) -> Result<WorkosUser, MigrateError> {
        let url = format!("{}/user_management/users/{id}", self.base_url);
        debug!(user = id, "updating target user");
        self.send_json(self.http.put(&url).json(req), "update user")
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<WorkosUser>, MigrateError> {
        let url = format!(
            "{}/user_management/users?email={}",
            self.base_url,
            urlencoding::encode(email)
        );
        let list: UserList = self.send_json(self.http.get(&url), "list users").await?;
        Ok(list.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provider_initialization() {
        let p = WorkosProvider::new(None, "sk_test".into(), Some(5)).unwrap();
        assert!(p.base_url.contains("workos"));
    }

    #[test]
    fn update_payload_omits_absent_fields() {
        let req = UpdateUser {
            email_verified: Some(true),
            ..Default::default()
        };
        let body = serde_json::to_string(&req).unwrap();
        assert_eq!(body, r#"{"email_verified":true}"#);
    }

    #[test]
    fn user_list_parses_workos_envelope() {
        let list: UserList = serde_json::from_str(
            r#"{"data":[{"id":"user_01","email":"a@x.com","email_verified":true}],
                "list_metadata":{"before":null,"after":null}}"#,
        )
        .unwrap();
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].id, "user_01");
    }
}
