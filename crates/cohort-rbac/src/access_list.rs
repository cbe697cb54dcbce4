//! Tab-separated access list.
//!
//! ```text
//! issuer                      username   D1  D2
//! https://idp.example.org     alice      4   0
//! https://idp.example.org     bob            2
//! ```
//!
//! Each row grants per-dataset tiers to one `(issuer, username)` pair. Blank
//! cells and values outside 0..=4 grant nothing. If any pair appears twice
//! the whole list is disabled and every caller receives an empty map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use cohort_types::{AccessMap, Tier};
use tracing::{error, info, warn};

use crate::tier::{AccessError, Result};

/// Parsed access list.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    entries: HashMap<(String, String), AccessMap>,
    disabled: bool,
}

impl AccessList {
    /// Parses the file contents.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with('#'));

        let header: Vec<&str> = lines
            .next()
            .ok_or_else(|| AccessError::MalformedHeader("empty file".to_string()))?
            .split('\t')
            .map(str::trim)
            .collect();
        if header.len() < 2
            || !header[0].eq_ignore_ascii_case("issuer")
            || !header[1].eq_ignore_ascii_case("username")
        {
            return Err(AccessError::MalformedHeader(header.join(",")));
        }
        let datasets = &header[2..];

        let mut entries: HashMap<(String, String), AccessMap> = HashMap::new();
        let mut duplicates = Vec::new();
        for line in lines {
            let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
            if cells.len() < 2 {
                warn!(line = %line, "Skipping access list row without issuer and username");
                continue;
            }
            let key = (cells[0].to_string(), cells[1].to_string());
            let access: AccessMap = datasets
                .iter()
                .zip(&cells[2..])
                .filter_map(|(dataset, cell)| {
                    let tier = cell.parse::<i64>().ok().and_then(|v| Tier::try_from(v).ok())?;
                    Some(((*dataset).to_string(), tier))
                })
                .collect();
            if entries.insert(key.clone(), access).is_some() {
                duplicates.push(key);
            }
        }

        if !duplicates.is_empty() {
            for (issuer, username) in &duplicates {
                error!(issuer = %issuer, username = %username, "Duplicate access list entry");
            }
            error!("Access list disabled until duplicate entries are removed");
            return Ok(Self {
                entries: HashMap::new(),
                disabled: true,
            });
        }

        Ok(Self {
            entries,
            disabled: false,
        })
    }

    /// Reads and parses a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AccessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// The caller's access map; empty for unknown callers.
    pub fn access_map(&self, issuer: &str, username: &str) -> AccessMap {
        self.entries
            .get(&(issuer.to_string(), username.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An [`AccessList`] that re-reads its file whenever the mtime changes.
#[derive(Debug)]
pub struct WatchedAccessList {
    path: PathBuf,
    state: RwLock<Snapshot>,
}

#[derive(Debug)]
struct Snapshot {
    modified: Option<SystemTime>,
    list: Arc<AccessList>,
}

impl WatchedAccessList {
    /// Loads the file once; fails if it cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let modified = modified_at(&path);
        let list = AccessList::load(&path)?;
        info!(path = %path.display(), callers = list.len(), "Access list loaded");
        Ok(Self {
            path,
            state: RwLock::new(Snapshot {
                modified,
                list: Arc::new(list),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current list, reloading first if the file changed.
    ///
    /// A failed reload keeps serving the previous list.
    pub fn current(&self) -> Arc<AccessList> {
        let modified = modified_at(&self.path);
        {
            let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.modified == modified {
                return Arc::clone(&state.list);
            }
        }

        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.modified != modified {
            match AccessList::load(&self.path) {
                Ok(list) => {
                    info!(path = %self.path.display(), callers = list.len(), "Access list reloaded");
                    state.list = Arc::new(list);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Access list reload failed, keeping previous");
                }
            }
            state.modified = modified;
        }
        Arc::clone(&state.list)
    }

    pub fn access_map(&self, issuer: &str, username: &str) -> AccessMap {
        self.current().access_map(issuer, username)
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    const LIST: &str = "issuer\tusername\tD1\tD2\n\
                        https://idp\talice\t4\t0\n\
                        https://idp\tbob\t\t2\n\
                        https://idp\tcarol\t7\tx\n";

    #[test]
    fn test_parse_grants() {
        let list = AccessList::parse(LIST).unwrap();
        let alice = list.access_map("https://idp", "alice");
        assert_eq!(alice.tier("D1"), Some(Tier::MAX));
        assert_eq!(alice.tier("D2"), Some(Tier::MIN));

        let bob = list.access_map("https://idp", "bob");
        assert_eq!(bob.tier("D1"), None);
        assert_eq!(bob.tier("D2"), Some(Tier::new(2).unwrap()));
    }

    #[test]
    fn test_out_of_range_and_garbage_dropped() {
        let list = AccessList::parse(LIST).unwrap();
        assert!(list.access_map("https://idp", "carol").is_empty());
    }

    #[test]
    fn test_unknown_caller_gets_empty_map() {
        let list = AccessList::parse(LIST).unwrap();
        assert!(list.access_map("https://other", "alice").is_empty());
    }

    #[test]
    fn test_duplicates_disable_list() {
        let text = format!("{LIST}https://idp\talice\t1\t1\n");
        let list = AccessList::parse(&text).unwrap();
        assert!(list.is_disabled());
        assert!(list.access_map("https://idp", "bob").is_empty());
    }

    #[test]
    fn test_bad_header_rejected() {
        let err = AccessList::parse("user\tissuer\tD1\n").unwrap_err();
        assert!(matches!(err, AccessError::MalformedHeader(_)));
        assert!(AccessList::parse("").is_err());
    }

    #[test]
    fn test_watched_list_reloads_on_change() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("access.tsv");
        fs::write(&path, "issuer\tusername\tD1\nidp\talice\t1\n").unwrap();

        let watched = WatchedAccessList::open(&path).unwrap();
        assert_eq!(watched.access_map("idp", "alice").tier("D1"), Tier::new(1).ok());

        // Ensure the mtime moves even on coarse-grained filesystems.
        std::thread::sleep(Duration::from_millis(1100));
        fs::write(&path, "issuer\tusername\tD1\nidp\talice\t3\n").unwrap();

        assert_eq!(watched.access_map("idp", "alice").tier("D1"), Tier::new(3).ok());
    }

    #[test]
    fn test_watched_list_keeps_previous_on_bad_reload() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("access.tsv");
        fs::write(&path, "issuer\tusername\tD1\nidp\talice\t2\n").unwrap();
        let watched = WatchedAccessList::open(&path).unwrap();

        std::thread::sleep(Duration::from_millis(1100));
        fs::write(&path, "garbage header\n").unwrap();

        assert_eq!(watched.access_map("idp", "alice").tier("D1"), Tier::new(2).ok());
    }
}
