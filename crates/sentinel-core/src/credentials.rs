//! Authenticated session artifact for the source site.
//!
//! The blob is refreshed by an external tool; the pipeline only ever reads it.

use std::{collections::BTreeMap, fs, path::PathBuf};

use serde::Deserialize;

use crate::Result;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Cookies + anti-forgery token + user agent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SessionCredential {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default, rename = "csrf")]
    pub csrf_token: String,
    #[serde(default = "default_user_agent", rename = "agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl SessionCredential {
    /// A credential without cookies cannot authenticate anything.
    pub fn is_usable(&self) -> bool {
        !self.cookies.is_empty()
    }

    /// `Cookie` header value (`a=1; b=2`).
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn user_agent(&self) -> &str {
        if self.user_agent.trim().is_empty() {
            DEFAULT_USER_AGENT
        } else {
            &self.user_agent
        }
    }
}

/// Parse a credential blob. Anything that cannot authenticate yields `None`.
pub fn parse_credential(raw: &str) -> Option<SessionCredential> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<SessionCredential>(raw) {
        Ok(cred) if cred.is_usable() => Some(cred),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "session blob is malformed; treating as not authenticated");
            None
        }
    }
}

/// Port for whatever holds the current session credential.
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` means "not authenticated".
    fn load(&self) -> Result<Option<SessionCredential>>;
}

/// Credential blob stored as a JSON file on disk.
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileCredentialStore {
    fn load(&self) -> Result<Option<SessionCredential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(parse_credential(&raw))
    }
}
