//! Cookies captured by an external browser session.
//!
//! The crawler never drives a browser itself. A carrier that sits behind a
//! bot wall (LG U+) needs cookies exported from a real browser visit, either
//! as the `[{ "name": ..., "value": ... }, ...]` list webdrivers produce or as
//! a flat `{ "name": "value" }` object. The session is treated as opaque and
//! is not refreshed mid-run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::SetupError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieExport {
    List(Vec<BrowserCookie>),
    Map(BTreeMap<String, String>),
}

#[derive(Deserialize)]
struct BrowserCookie {
    name: String,
    value: String,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Keeps only cookies whose value survives a Latin-1 header encoding.
    pub fn from_cookies<I>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut kept = Vec::new();
        for (name, value) in cookies {
            if name.is_empty() {
                continue;
            }
            if value.chars().all(|c| (c as u32) <= 0xFF) {
                kept.push((name, value));
            } else {
                warn!(cookie = %name, "skipping cookie that is not Latin-1 encodable");
            }
        }
        Self { cookies: kept }
    }

    pub fn parse_cookie_json(text: &str) -> Result<Self, SetupError> {
        let export: CookieExport = serde_json::from_str(text)
            .map_err(|e| SetupError::Session(format!("unreadable cookie export: {}", e)))?;

        let pairs: Vec<(String, String)> = match export {
            CookieExport::List(list) => list.into_iter().map(|c| (c.name, c.value)).collect(),
            CookieExport::Map(map) => map.into_iter().collect(),
        };
        Ok(Self::from_cookies(pairs))
    }

    pub fn from_cookie_file(path: &Path) -> Result<Self, SetupError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SetupError::Session(format!("cannot read {}: {}", path.display(), e))
        })?;
        let session = Self::parse_cookie_json(&text)?;
        info!(path = %path.display(), cookies = session.len(), "loaded browser session");
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// `Cookie` header value, or `None` for an anonymous session.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let header = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        Some(header)
    }
}
