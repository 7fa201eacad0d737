// src/config/handles.rs
use std::fs;
use std::path::Path;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::ConfigError;

/// Load the tracked handle list. Supports a JSON array or TOML `handles = [..]`.
pub fn load_handles_from(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let raw = parse_handles(&content, ext.as_str()).ok_or_else(|| ConfigError::File {
        path: path.to_path_buf(),
        reason: "expected a JSON array of handles or TOML `handles = [...]`".into(),
    })?;

    let handles = clean_handles(raw)?;
    if handles.is_empty() {
        return Err(ConfigError::NoHandles {
            path: path.to_path_buf(),
        });
    }
    Ok(handles)
}

fn parse_handles(s: &str, hint_ext: &str) -> Option<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlHandles {
        handles: Vec<String>,
    }

    if hint_ext == "toml" {
        return toml::from_str::<TomlHandles>(s).ok().map(|t| t.handles);
    }
    serde_json::from_str::<Vec<String>>(s)
        .ok()
        .or_else(|| toml::from_str::<TomlHandles>(s).ok().map(|t| t.handles))
}

/// Strip a leading `@`, validate, and drop case-insensitive duplicates while
/// keeping first-seen order.
pub fn clean_handles(items: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if t.is_empty() {
            continue;
        }
        let h = normalize_handle(t)?;
        if !out.iter().any(|o| o.eq_ignore_ascii_case(&h)) {
            out.push(h);
        }
    }
    Ok(out)
}

pub fn normalize_handle(raw: &str) -> Result<String, ConfigError> {
    static RE_HANDLE: OnceCell<Regex> = OnceCell::new();
    let re = RE_HANDLE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]{1,15}$").expect("static handle regex is valid")
    });

    let h = raw.trim();
    let h = h.strip_prefix('@').unwrap_or(h);
    if re.is_match(h) {
        Ok(h.to_string())
    } else {
        Err(ConfigError::BadHandle(raw.to_string()))
    }
}
