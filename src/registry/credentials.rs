// On-host JSON credential store (.dockercfg)

use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{HostEnvironment, SessionError};
use crate::config::SessionConfig;

/// Registry host -> opaque auth blob
pub type CredentialMap = Map<String, Value>;

/// Resolve the credential file for the execution host.
///
/// An explicitly configured path wins; otherwise `$HOME` is looked up on the
/// host and joined with the configured file name. No file I/O happens here.
pub async fn resolve_path(
    config: &SessionConfig,
    env: &dyn HostEnvironment,
) -> Result<PathBuf, SessionError> {
    if let Some(path) = &config.credential_file {
        return Ok(path.clone());
    }

    let home = env
        .var("HOME")
        .await
        .map_err(|e| SessionError::Environment(format!("{:#}", e)))?
        .ok_or_else(|| SessionError::Environment("HOME is not set on the host".to_string()))?;

    Ok(Path::new(&home).join(&config.credential_file_name))
}

/// Read and parse the store. The top-level value must be a JSON object.
pub fn read(path: &Path) -> Result<CredentialMap, SessionError> {
    let read_error = |reason: String| SessionError::Read {
        path: path.to_path_buf(),
        reason,
    };

    let contents = std::fs::read_to_string(path).map_err(|e| read_error(e.to_string()))?;

    match serde_json::from_str::<Value>(&contents).map_err(|e| read_error(e.to_string()))? {
        Value::Object(map) => {
            debug!("Read {} entries from {}", map.len(), path.display());
            Ok(map)
        }
        other => Err(read_error(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Remove `key` if present. Returns whether an entry was removed.
pub fn remove_entry(store: &mut CredentialMap, key: &str) -> bool {
    store.remove(key).is_some()
}

/// Replace the store file with `store`.
///
/// The JSON is written to a temp file next to the target and renamed over it,
/// so a failed write never leaves a truncated store behind. The target's
/// permissions are carried over when it already exists. A symlinked store is
/// resolved first so the link itself survives.
pub fn write(path: &Path, store: &CredentialMap) -> Result<(), SessionError> {
    let write_error = |reason: String| SessionError::Write {
        path: path.to_path_buf(),
        reason,
    };

    let json = serde_json::to_string_pretty(store).map_err(|e| write_error(e.to_string()))?;

    let target = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            std::fs::canonicalize(path).map_err(|e| write_error(e.to_string()))?
        }
        _ => path.to_path_buf(),
    };

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_error(e.to_string()))?;
    tmp.write_all(json.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| write_error(e.to_string()))?;

    if let Ok(metadata) = std::fs::metadata(&target) {
        tmp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| write_error(e.to_string()))?;
    }

    tmp.persist(&target).map_err(|e| write_error(e.error.to_string()))?;

    debug!("Wrote {} entries to {}", store.len(), path.display());
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
