// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::BusError;

/// Load every `<key>.json` file in `dir` into a map. Missing directory is
/// treated as "no persisted entries" rather than an error, matching a
/// non-persistent topic's empty startup state.
pub fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<HashMap<String, T>, BusError> {
    let mut out = HashMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(BusError::PersistLoadFailed(e.to_string())),
    };
    for entry in entries {
        let entry = entry.map_err(|e| BusError::PersistLoadFailed(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| BusError::PersistLoadFailed(e.to_string()))?;
        let value: T = serde_json::from_str(&raw)
            .map_err(|e| BusError::PersistLoadFailed(format!("{}: {e}", path.display())))?;
        out.insert(key.to_owned(), value);
    }
    Ok(out)
}

/// Write `<dir>/<key>.json` atomically: serialize, write to a sibling
/// `.tmp` file, then rename over the destination.
pub fn save_key<T: Serialize>(dir: &Path, key: &str, value: &T) -> Result<(), BusError> {
    std::fs::create_dir_all(dir).map_err(|e| BusError::PersistWriteFailed(e.to_string()))?;
    let final_path = key_path(dir, key);
    let tmp_path = final_path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| BusError::SerializeFailed(e.to_string()))?;
    std::fs::write(&tmp_path, body).map_err(|e| BusError::PersistWriteFailed(e.to_string()))?;
    std::fs::rename(&tmp_path, &final_path).map_err(|e| BusError::PersistWriteFailed(e.to_string()))?;
    Ok(())
}

pub fn remove_key(dir: &Path, key: &str) -> Result<(), BusError> {
    let path = key_path(dir, key);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BusError::PersistWriteFailed(e.to_string())),
    }
}

fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        n: u32,
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        save_key(dir.path(), "w1", &Widget { n: 7 }).unwrap();
        let loaded: HashMap<String, Widget> = load_all(dir.path()).unwrap();
        assert_eq!(loaded.get("w1"), Some(&Widget { n: 7 }));
    }

    #[test]
    fn load_all_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let loaded: HashMap<String, Widget> = load_all(&missing).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn remove_key_then_load_omits_it() {
        let dir = tempfile::tempdir().unwrap();
        save_key(dir.path(), "w1", &Widget { n: 1 }).unwrap();
        remove_key(dir.path(), "w1").unwrap();
        let loaded: HashMap<String, Widget> = load_all(dir.path()).unwrap();
        assert!(loaded.is_empty());
    }
}
