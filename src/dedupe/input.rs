use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// A locally-known account that shares its email with at least one other.
/// Read-only input to resolution; echoed verbatim into the decision output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub id: String,
    pub email: String,
    /// Reference into the source provider; a candidate survives resolution
    /// only if this still resolves upstream.
    #[serde(alias = "auth0Sub")]
    pub auth0_sub: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, alias = "isSuperUser", deserialize_with = "de_flag")]
    pub is_super_user: bool,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, alias = "providerId")]
    pub provider_id: Option<String>,
}

/// Postgres-style boolean cells: t/f, true/false, 1/0, empty.
fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(d)?;
    Ok(matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "t" | "true" | "1" | "yes"
    ))
}

/// Read candidate rows and group them by lowercased email, preserving
/// first-seen order. Rows that fail to parse are logged with their position
/// and skipped; one bad row never aborts the batch.
pub fn read_groups(path: &Path) -> Result<IndexMap<String, Vec<DuplicateCandidate>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open duplicate input {}", path.display()))?;

    let mut groups: IndexMap<String, Vec<DuplicateCandidate>> = IndexMap::new();
    for (row, result) in reader.deserialize::<DuplicateCandidate>().enumerate() {
        let candidate = match result {
            Ok(c) => c,
            Err(err) => {
                warn!(row, error = %err, "skipping malformed duplicate row");
                continue;
            }
        };
        let key = candidate.email.trim().to_lowercase();
        if key.is_empty() {
            warn!(row, id = %candidate.id, "skipping row with empty email");
            continue;
        }
        groups.entry(key).or_default().push(candidate);
    }
    Ok(groups)
}
