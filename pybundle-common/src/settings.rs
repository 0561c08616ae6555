// pybundle-common/src/settings.rs
//! Persisted key/value settings backed by a TOML document.
//!
//! Keys are dotted paths into nested tables: `mode.offline` lives at
//! `[mode] offline = ...` on disk. The store is shared behind an `Arc` and
//! written back once, when the process exits.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use toml::{Table, Value};
use tracing::{debug, warn};

use super::error::{BundleError, Result};

/// Well-known setting keys.
pub mod keys {
    pub const OFFLINE: &str = "mode.offline";
    pub const FASTEST_RUNTIME_MIRROR: &str = "mirrors.fastest.runtime";
    pub const FASTEST_PACKAGE_MIRROR: &str = "mirrors.fastest.packages";
    pub const RUNTIME_MIRRORS: &str = "mirrors.runtime";
    pub const PACKAGE_MIRRORS: &str = "mirrors.packages";

    /// Checksum slot for a runtime archive, e.g. `runtime.checksum.python-3_8_10-embed-amd64`.
    pub fn runtime_checksum(artifact_id: &str) -> String {
        let id = artifact_id.trim_end_matches(".zip").replace('.', "_");
        format!("runtime.checksum.{id}")
    }
}

#[derive(Debug)]
pub struct Settings {
    path: Option<PathBuf>,
    inner: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    table: Table,
    dirty: bool,
}

impl Settings {
    /// Loads the store from `path`. A missing file yields an empty store; an
    /// unreadable one is logged and replaced on the next save.
    pub fn load(path: &Path) -> Result<Self> {
        let table = if path.is_file() {
            let text = fs::read_to_string(path)?;
            match text.parse::<Table>() {
                Ok(table) => table,
                Err(e) => {
                    warn!(
                        "Ignoring malformed settings file {}: {}",
                        path.display(),
                        e
                    );
                    Table::new()
                }
            }
        } else {
            debug!("No settings file at {}, starting empty", path.display());
            Table::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: RwLock::new(State {
                table,
                dirty: false,
            }),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: RwLock::new(State::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self.inner.read().ok()?;
        lookup(&state.table, key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Boolean(b) => Some(b),
            Value::String(s) => parse_bool(&s),
            _ => None,
        }
    }

    /// String entries of the table at `key`. Non-string values are skipped.
    pub fn get_table(&self, key: &str) -> Option<BTreeMap<String, String>> {
        match self.get(key)? {
            Value::Table(t) => Some(
                t.into_iter()
                    .filter_map(|(k, v)| match v {
                        Value::String(s) => Some((k, s)),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut state = self.write_state()?;
        let (parent, leaf) = split_key(key)?;
        let mut table = &mut state.table;
        for segment in parent {
            let slot = table
                .entry(segment.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            if !slot.is_table() {
                *slot = Value::Table(Table::new());
            }
            table = slot.as_table_mut().ok_or_else(|| {
                BundleError::Generic(format!("Settings key '{key}' is not a table"))
            })?;
        }
        if table.get(leaf) != Some(&value) {
            debug!("Setting {} = {}", key, value);
            table.insert(leaf.to_string(), value);
            state.dirty = true;
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let mut state = self.write_state()?;
        let (parent, leaf) = split_key(key)?;
        let mut table = &mut state.table;
        for segment in parent {
            match table.get_mut(segment) {
                Some(Value::Table(t)) => table = t,
                _ => return Ok(None),
            }
        }
        let removed = table.remove(leaf);
        if removed.is_some() {
            state.dirty = true;
        }
        Ok(removed)
    }

    /// Every leaf value, flattened to dotted keys and sorted.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        if let Ok(state) = self.inner.read() {
            flatten("", &state.table, &mut out);
        }
        out
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.read().map(|s| s.dirty).unwrap_or(false)
    }

    /// Writes the store back if anything changed since load.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut state = self.write_state()?;
        if !state.dirty {
            return Ok(());
        }
        let text = toml::to_string_pretty(&state.table)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_file_name(format!(
            ".{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            BundleError::IoError(format!(
                "Failed to persist settings to {}: {e}",
                path.display()
            ))
        })?;
        state.dirty = false;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|_| BundleError::Generic("Settings lock poisoned".to_string()))
    }
}

/// Interprets a raw command-line value: booleans and integers keep their type.
pub fn parse_value(raw: &str) -> Value {
    if raw == "true" || raw == "false" {
        Value::Boolean(raw == "true")
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else {
        Value::String(raw.to_string())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn split_key(key: &str) -> Result<(Vec<&str>, &str)> {
    let mut segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(BundleError::ValidationError(format!(
            "Invalid settings key '{key}'"
        )));
    }
    let leaf = segments.pop().unwrap_or_default();
    Ok((segments, leaf))
}

fn lookup<'a>(table: &'a Table, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.').peekable();
    let mut current = table;
    while let Some(segment) = segments.next() {
        let value = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        current = value.as_table()?;
    }
    None
}

fn flatten(prefix: &str, table: &Table, out: &mut Vec<(String, Value)>) {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            Value::Table(t) => flatten(&key, t, out),
            other => out.push((key, other.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_keys_create_nested_tables() {
        let settings = Settings::in_memory();
        settings.set(keys::OFFLINE, true).unwrap();
        settings
            .set(keys::FASTEST_RUNTIME_MIRROR, "https://example.org/python/")
            .unwrap();

        assert_eq!(settings.get_bool(keys::OFFLINE), Some(true));
        assert_eq!(
            settings.get_str("mirrors.fastest.runtime").as_deref(),
            Some("https://example.org/python/")
        );
        let entries: Vec<String> = settings.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(entries, vec!["mirrors.fastest.runtime", "mode.offline"]);
    }

    #[test]
    fn remove_clears_value_and_marks_dirty() {
        let settings = Settings::in_memory();
        settings.set("url.pip", "https://pypi.org/simple/").unwrap();
        assert!(settings.remove("url.pip").unwrap().is_some());
        assert!(settings.get("url.pip").is_none());
        assert!(settings.remove("url.missing").unwrap().is_none());
        assert!(settings.is_dirty());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let settings = Settings::load(&path).unwrap();
        settings
            .set(&keys::runtime_checksum("python-3.8.10-embed-amd64.zip"), "abc123")
            .unwrap();
        settings.save().unwrap();
        assert!(!settings.is_dirty());

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(
            reloaded
                .get_str("runtime.checksum.python-3_8_10-embed-amd64")
                .as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert!(settings.entries().is_empty());
    }

    #[test]
    fn rejects_empty_key_segments() {
        let settings = Settings::in_memory();
        assert!(settings.set("mode..offline", true).is_err());
    }

    #[test]
    fn parse_value_keeps_scalar_types() {
        assert_eq!(parse_value("true"), Value::Boolean(true));
        assert_eq!(parse_value("42"), Value::Integer(42));
        assert_eq!(
            parse_value("https://x/"),
            Value::String("https://x/".to_string())
        );
    }
}
