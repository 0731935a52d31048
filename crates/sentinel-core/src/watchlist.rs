//! Watchlist terms that let otherwise unclassified notifications through.

use std::{fs, path::PathBuf};

use crate::Result;

/// Ordered user-supplied substrings that gate low-priority notifications.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Watchlist {
    terms: Vec<String>,
}

impl Watchlist {
    pub fn new(terms: Vec<String>) -> Self {
        let terms = terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Case-insensitive substring match of any term.
    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.terms
            .iter()
            .any(|t| haystack.contains(&t.to_lowercase()))
    }

    /// Returns false if an equal term (ignoring case) is already present.
    pub fn add(&mut self, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() || self.position(term).is_some() {
            return false;
        }
        self.terms.push(term.to_string());
        true
    }

    pub fn remove(&mut self, term: &str) -> bool {
        match self.position(term.trim()) {
            Some(idx) => {
                self.terms.remove(idx);
                true
            }
            None => false,
        }
    }

    fn position(&self, term: &str) -> Option<usize> {
        let needle = term.to_lowercase();
        self.terms.iter().position(|t| t.to_lowercase() == needle)
    }
}

/// Where the poll cycle reads the current watchlist from.
pub trait WatchlistSource: Send + Sync {
    fn load(&self) -> Watchlist;
}

impl WatchlistSource for Watchlist {
    fn load(&self) -> Watchlist {
        self.clone()
    }
}

impl WatchlistSource for WatchlistFile {
    fn load(&self) -> Watchlist {
        WatchlistFile::load(self)
    }
}

/// Watchlist persisted as a JSON array of strings.
#[derive(Clone, Debug)]
pub struct WatchlistFile {
    path: PathBuf,
}

impl WatchlistFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing or malformed files read as an empty watchlist.
    pub fn load(&self) -> Watchlist {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Watchlist::default();
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(terms) => Watchlist::new(terms),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "watchlist is malformed; using empty list");
                Watchlist::default()
            }
        }
    }

    pub fn save(&self, watchlist: &Watchlist) -> Result<()> {
        let json = serde_json::to_string_pretty(watchlist.terms())?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
