//! JSON hand-off between pipeline stages.
//!
//! Every stage reads its inputs and writes its output as a whole-file snapshot; nothing is
//! updated in place.

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::PipelineError;

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, PipelineError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PipelineError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Like [`read_json`], but a missing file is `Ok(None)`.
pub fn read_optional<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Option<T>, PipelineError> {
    let path = path.as_ref();
    match fs::metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} not found, skipping", path.display());
            Ok(None)
        }
        _ => read_json(path).map(Some),
    }
}

/// Pretty-printed with two-space indentation; parent directories are created as needed.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), PipelineError> {
    let path = path.as_ref();
    let io_err = |source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_json::to_string_pretty(value).map_err(|source| PipelineError::Json {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, body).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn writes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json(&path, &json!({ "tokens": [1, 2] })).unwrap();

        let back: Value = read_json(&path).unwrap();
        assert_eq!(back["tokens"], json!([1, 2]));
        assert!(std::fs::read_to_string(&path).unwrap().contains("\n  \"tokens\""));
    }

    #[test]
    fn missing_optional_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<Value> = read_optional(dir.path().join("nope.json")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn malformed_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_json::<Value>(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Json { .. }));
        assert!(err.to_string().contains("bad.json"));
    }
}
