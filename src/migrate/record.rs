use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::ParseError;

/// One input unit: a user to migrate, or a previously exported id mapping to
/// replay. Immutable once read.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// Stable source identifier (`user_id`, or `auth0_user_id` on mapping lines).
    pub user_id: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub region: Option<String>,
    /// Pre-existing target identifier; forces the update branch when present.
    pub workos_user_id: Option<String>,
}

fn value_as_bool(v: &Value) -> Option<bool> {
    if let Some(b) = v.as_bool() {
        return Some(b);
    }
    v.as_str().map(|s| {
        matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "t" | "1" | "yes"
        )
    })
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl SourceRecord {
    /// Parse one non-blank NDJSON line. Accepts both the user-export shape
    /// (`user_id`, `email`, profile fields) and the mapping shape
    /// (`auth0_user_id` + `workos_user_id`).
    pub fn parse(line: &str) -> Result<Self, String> {
        let v: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
        let Some(obj) = v.as_object() else {
            return Err("expected a JSON object".into());
        };
        let Some(user_id) = str_field(obj, "user_id").or_else(|| str_field(obj, "auth0_user_id"))
        else {
            return Err("missing user_id".into());
        };
        Ok(SourceRecord {
            user_id,
            email: str_field(obj, "email"),
            email_verified: obj.get("email_verified").and_then(value_as_bool),
            given_name: str_field(obj, "given_name"),
            family_name: str_field(obj, "family_name"),
            region: str_field(obj, "region"),
            workos_user_id: str_field(obj, "workos_user_id"),
        })
    }
}

/// Lazy, ordered stream of parsed records from an append-only NDJSON file.
///
/// Blank lines are skipped and consume no record index. A line that fails to
/// parse yields `Err` for that index only; the stream continues. Skip offsets
/// are applied by the caller against the yielded index, so position accounting
/// survives malformed lines.
pub struct RecordStream {
    lines: Lines<BufReader<File>>,
    index: usize,
}

impl RecordStream {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open record source {}", path.display()))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            index: 0,
        })
    }
}

impl Iterator for RecordStream {
    type Item = (usize, Result<SourceRecord, ParseError>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    let index = self.index;
                    self.index += 1;
                    return Some((
                        index,
                        Err(ParseError {
                            index,
                            message: format!("read failed: {e}"),
                        }),
                    ));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let index = self.index;
            self.index += 1;
            let parsed = SourceRecord::parse(&line).map_err(|message| ParseError {
                index,
                message,
            });
            return Some((index, parsed));
        }
    }
}
