//! Play statistics keyed by signature.
//!
//! Counts accumulate in memory during a session; `save` merges them into the
//! JSON file on disk (plays summed, the latest like or dislike replacing the
//! stored opinion, tags appended) and starts a fresh session.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Statistics for one narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub signature_key: String,
    /// Musical key name, when known.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub played: u64,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub disliked: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl HistoryEntry {
    pub fn new(signature_key: &str, key: Option<&str>) -> Self {
        HistoryEntry {
            signature_key: signature_key.to_string(),
            key: key.map(str::to_string),
            played: 0,
            liked: false,
            disliked: false,
            tags: Vec::new(),
        }
    }

    /// Fold this session's entry into a stored one.
    fn merge_into(self, stored: &mut HistoryEntry) {
        stored.played += self.played;
        if self.liked {
            stored.liked = true;
            stored.disliked = false;
        }
        if self.disliked {
            stored.disliked = true;
            stored.liked = false;
        }
        if stored.key.is_none() {
            stored.key = self.key;
        }
        stored.tags.extend(self.tags);
    }
}

pub type HistoryMap = BTreeMap<String, HistoryEntry>;

/// Session history with a default file location.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    path: PathBuf,
    entries: HistoryMap,
}

impl HistoryManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HistoryManager {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a narrative. Later calls for the same key only fill in a
    /// missing musical key.
    pub fn add(&mut self, signature_key: &str, musical_key: Option<&str>) {
        let entry = self.entry_mut(signature_key);
        if entry.key.is_none() {
            entry.key = musical_key.map(str::to_string);
        }
    }

    pub fn like(&mut self, signature_key: &str) {
        let entry = self.entry_mut(signature_key);
        entry.liked = true;
        entry.disliked = false;
    }

    pub fn dislike(&mut self, signature_key: &str) {
        let entry = self.entry_mut(signature_key);
        entry.disliked = true;
        entry.liked = false;
    }

    pub fn incr_played(&mut self, signature_key: &str) {
        self.entry_mut(signature_key).played += 1;
    }

    pub fn add_tag(&mut self, signature_key: &str, tag: &str) {
        self.entry_mut(signature_key).tags.push(tag.to_string());
    }

    pub fn get(&self, signature_key: &str) -> Option<&HistoryEntry> {
        self.entries.get(signature_key)
    }

    pub fn entries(&self) -> &HistoryMap {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, signature_key: &str) -> &mut HistoryEntry {
        self.entries
            .entry(signature_key.to_string())
            .or_insert_with(|| HistoryEntry::new(signature_key, None))
    }

    /// Read a history file; a missing file is an empty history.
    pub fn load(path: &Path) -> Result<HistoryMap> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Merge the session into `path` (or the default file) and clear it.
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf> {
        let path = path.map_or_else(|| self.path.clone(), Path::to_path_buf);
        let mut stored = Self::load(&path)?;

        for (signature_key, entry) in std::mem::take(&mut self.entries) {
            match stored.get_mut(&signature_key) {
                Some(existing) => entry.merge_into(existing),
                None => {
                    stored.insert(signature_key, entry);
                }
            }
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&stored)?)?;
        log::info!("History saved to {} ({} entries)", path.display(), stored.len());
        Ok(path)
    }
}
