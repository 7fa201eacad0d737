// src/config/cookies.rs
//! Cookie-Editor JSON export -> credential material for the X source.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// One entry of a Cookie-Editor export. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    /// Empty means "no domain recorded" and is treated as an X cookie.
    #[serde(default)]
    pub domain: String,
}

const X_DOMAINS: [&str; 2] = ["x.com", "twitter.com"];

impl CookieEntry {
    /// Whether the browser would send this cookie to x.com.
    pub fn applies_to_x(&self) -> bool {
        let d = self.domain.trim().trim_start_matches('.').to_ascii_lowercase();
        d.is_empty()
            || X_DOMAINS
                .iter()
                .any(|x| d == *x || d.ends_with(&format!(".{x}")))
    }
}

/// Cookies that authenticate the X session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    cookies: Vec<CookieEntry>,
}

// Cookie values are secrets; keep them out of Debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.cookies.iter().map(|c| c.name.as_str()).collect();
        f.debug_struct("Credentials").field("cookies", &names).finish()
    }
}

impl Credentials {
    /// Cookies for other sites in the same export are dropped.
    pub fn new(cookies: Vec<CookieEntry>) -> Self {
        let cookies = cookies.into_iter().filter(CookieEntry::applies_to_x).collect();
        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    pub fn has_session(&self) -> bool {
        self.get("auth_token").is_some() && self.get("ct0").is_some()
    }

    /// `Cookie` request header value. Later duplicates of a name win.
    pub fn cookie_header(&self) -> String {
        let mut seen: Vec<(&str, &str)> = Vec::new();
        for c in &self.cookies {
            if let Some(slot) = seen.iter_mut().find(|(n, _)| *n == c.name) {
                slot.1 = c.value.as_str();
            } else {
                seen.push((c.name.as_str(), c.value.as_str()));
            }
        }
        seen.iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn load_cookies_from(path: &Path) -> Result<Credentials, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let entries: Vec<CookieEntry> =
        serde_json::from_str(&content).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let creds = Credentials::new(entries);
    if !creds.has_session() {
        return Err(ConfigError::MissingCookies {
            path: path.to_path_buf(),
        });
    }
    Ok(creds)
}
