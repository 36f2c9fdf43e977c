use crate::domain::{SimbatchError, SimbatchResult};
use serde::Serialize;
use std::fs;
use std::path::Path;

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn to_pretty_json<T: Serialize>(value: &T) -> SimbatchResult<String> {
    serde_json::to_string_pretty(value)
        .map(|json| normalize_text_artifact(&json))
        .map_err(|source| {
            SimbatchError::internal("SYS.SERIALIZE", format!("failed to serialize report: {}", source))
        })
}

/// Writes `value` as pretty JSON, creating parent directories.
pub fn write_json_report<T: Serialize>(path: &Path, value: &T) -> SimbatchResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| {
            SimbatchError::io_system(
                "IO.REPORT_DIR",
                format!("failed to create report directory '{}': {}", parent.display(), source),
            )
        })?;
    }
    fs::write(path, to_pretty_json(value)?).map_err(|source| {
        SimbatchError::io_system(
            "IO.REPORT_WRITE",
            format!("failed to write report '{}': {}", path.display(), source),
        )
    })
}
