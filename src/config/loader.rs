//! Configuration loading and environment parsing.

use serde_json::{Map, Value};
use std::path::Path;

use super::Config;

/// Load configuration by overlaying JSON sources, lowest precedence
/// first:
/// 1) defaults compiled into the binary
/// 2) `config.json` in the current working directory
/// 3) the file named by `ARBITER_CONFIG_PATH`
/// 4) raw JSON in `ARBITER_CONFIG_JSON`
/// 5) individual `ARBITER__`-prefixed variables with `__` as the nested
///    separator, e.g. `ARBITER__PORT=8080` or
///    `ARBITER__GAME__MAX_SPECTATORS=10`
///
/// A source that cannot be read or parsed is reported on stderr and
/// skipped; `load()` always returns a usable `Config`.
#[must_use]
pub fn load() -> Config {
    let defaults = Config::default();
    let base = serde_json::to_value(&defaults).unwrap_or(Value::Null);

    let merged = file_layer(Path::new("config.json"))
        .into_iter()
        .chain(env_path_layer())
        .chain(env_json_layer())
        .chain(env_var_layers())
        .fold(base, overlay);

    match serde_json::from_value(merged) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to deserialize config; using defaults: {err}");
            defaults
        }
    }
}

/// Read one JSON config file, if present.
fn file_layer(path: &Path) -> Option<Value> {
    if path.as_os_str().is_empty() || !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            eprintln!("Failed to read config file {}: {err}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(doc) => Some(doc),
        Err(err) => {
            eprintln!("Failed to parse config file {}: {err}", path.display());
            None
        }
    }
}

fn env_path_layer() -> Option<Value> {
    let path = std::env::var("ARBITER_CONFIG_PATH").ok()?;
    file_layer(Path::new(&path))
}

fn env_json_layer() -> Option<Value> {
    let raw = std::env::var("ARBITER_CONFIG_JSON").ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(doc) => Some(doc),
        Err(err) => {
            eprintln!("Failed to parse ARBITER_CONFIG_JSON: {err}");
            None
        }
    }
}

/// One overlay document per `ARBITER__`-prefixed variable.
fn env_var_layers() -> Vec<Value> {
    std::env::vars()
        .filter_map(|(key, raw)| {
            let spec = key.strip_prefix("ARBITER__")?.to_string();
            override_layer(&spec, &raw)
        })
        .collect()
}

/// Build the overlay document for one override from the inside out:
/// `GAME__MAX_SPECTATORS` with value `10` becomes
/// `{"game":{"max_spectators":10}}`.
fn override_layer(spec: &str, raw: &str) -> Option<Value> {
    let segments: Vec<String> = spec
        .split("__")
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    if segments.is_empty() {
        return None;
    }

    let document = segments
        .into_iter()
        .rev()
        .fold(env_scalar(raw.trim()), |inner, segment| {
            Value::Object(Map::from_iter([(segment, inner)]))
        });
    Some(document)
}

/// Env values are JSON when they parse as JSON, plain strings otherwise.
fn env_scalar(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Overlay `patch` onto `base`: objects combine key-wise, any other
/// pairing takes the patch value wholesale.
fn overlay(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let combined = match base_map.remove(&key) {
                    Some(base_value) => overlay(base_value, patch_value),
                    None => patch_value,
                };
                base_map.insert(key, combined);
            }
            Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}
