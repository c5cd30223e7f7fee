use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::error::MigrateError;
use crate::migrate::ledger::{Ledger, MigrationOutcome};
use crate::migrate::record::SourceRecord;
use crate::providers::workos::{CreateUser, TargetDirectory, UpdateUser, WorkosUser};

/// Result of one upsert attempt, consumed exhaustively by the ledger step.
#[derive(Debug)]
pub enum UpsertOutcome {
    Created(WorkosUser),
    Updated(WorkosUser),
    /// Soft failure: the record could neither be created nor unambiguously
    /// matched. Logged and counted; the run continues.
    Unresolved(String),
}

/// Per-record idempotent upsert-with-fallback against the target service.
///
/// A record that already carries a target identifier always takes the update
/// branch, never the create branch. Rate-limit failures propagate unchanged
/// at every step; they are never swallowed here.
pub struct MigrationWorker {
    target: Arc<dyn TargetDirectory>,
    ledger: Arc<Ledger>,
}

fn create_payload(record: &SourceRecord, email: &str) -> CreateUser {
    CreateUser {
        email: email.to_string(),
        email_verified: record.email_verified.unwrap_or(false),
        first_name: record.given_name.clone(),
        last_name: record.family_name.clone(),
        metadata: Some(source_metadata(record, None)),
    }
}

fn update_payload(record: &SourceRecord, existing: &WorkosUser) -> UpdateUser {
    UpdateUser {
        email_verified: record.email_verified,
        first_name: record.given_name.clone(),
        last_name: record.family_name.clone(),
        metadata: Some(source_metadata(record, existing.metadata.as_ref())),
    }
}

/// Back-reference to the source identifier, merged over any metadata the
/// target account already carries.
fn source_metadata(record: &SourceRecord, existing: Option<&Value>) -> Value {
    let mut map = existing
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    map.insert("auth0_user_id".to_string(), json!(record.user_id));
    if let Some(region) = &record.region {
        map.insert("region".to_string(), json!(region));
    }
    Value::Object(map)
}

impl MigrationWorker {
    pub fn new(target: Arc<dyn TargetDirectory>, ledger: Arc<Ledger>) -> Self {
        Self { target, ledger }
    }

    /// Materialize or update the target account for one record, then append
    /// the outcome to the ledger before reporting completion.
    pub async fn migrate(&self, record: &SourceRecord) -> Result<UpsertOutcome, MigrateError> {
        let outcome = self.upsert(record).await?;
        let line = match &outcome {
            UpsertOutcome::Created(user) => Some(MigrationOutcome {
                workos_user_id: user.id.clone(),
                auth0_user_id: record.user_id.clone(),
                created: true,
            }),
            UpsertOutcome::Updated(user) => Some(MigrationOutcome {
                workos_user_id: user.id.clone(),
                auth0_user_id: record.user_id.clone(),
                created: false,
            }),
            UpsertOutcome::Unresolved(_) => None,
        };
        if let Some(line) = line {
            self.ledger.append(&line).await.map_err(MigrateError::Fatal)?;
        }
        Ok(outcome)
    }

    async fn upsert(&self, record: &SourceRecord) -> Result<UpsertOutcome, MigrateError> {
        if let Some(id) = &record.workos_user_id {
            let existing = self.target.get_user(id).await?;
            let updated = self
                .target
                .update_user(id, &update_payload(record, &existing))
                .await?;
            return Ok(UpsertOutcome::Updated(updated));
        }

        let Some(email) = record.email.as_deref() else {
            return Ok(UpsertOutcome::Unresolved(
                "record has no email and no target id".to_string(),
            ));
        };

        match self.target.create_user(&create_payload(record, email)).await {
            Ok(user) => Ok(UpsertOutcome::Created(user)),
            Err(err) if err.is_rate_limited() => Err(err),
            Err(err) => {
                warn!(user = %record.user_id, error = %err, "create failed; falling back to email lookup");
                let matches = self.target.find_by_email(&email.to_lowercase()).await?;
                match matches.as_slice() {
                    [only] => {
                        let updated = self
                            .target
                            .update_user(&only.id, &update_payload(record, only))
                            .await?;
                        Ok(UpsertOutcome::Updated(updated))
                    }
                    [] => Ok(UpsertOutcome::Unresolved(format!(
                        "could not find or create: no account matches {email}"
                    ))),
                    many => Ok(UpsertOutcome::Unresolved(format!(
                        "could not find or create: {} accounts match {email}",
                        many.len()
                    ))),
                }
            }
        }
    }
}
