use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::common::{ProjectPath, content_hash};

/// One tracked file in `.rapidkit/hashes.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub hash: String,
    pub module: String,
    pub module_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_hash: Option<String>,
}

/// Project-relative path → last written content hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashRegistry {
    files: BTreeMap<ProjectPath, HashRecord>,
}

impl HashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bytes just written to `path`.
    ///
    /// `previous_hash` is set to the prior entry's hash when the content
    /// changed, and kept as-is when it did not. With `snapshot` the new hash
    /// is also pinned as `snapshot_hash`.
    pub fn record_file_hash(
        &mut self,
        path: &ProjectPath,
        module: &str,
        version: &str,
        bytes: &[u8],
        snapshot: bool,
    ) -> &HashRecord {
        let hash = content_hash(bytes);
        let prior = self.files.get(path);

        let previous_hash = match prior {
            Some(p) if p.hash != hash => Some(p.hash.clone()),
            Some(p) => p.previous_hash.clone(),
            None => None,
        };
        let snapshot_hash = if snapshot {
            Some(hash.clone())
        } else {
            prior.and_then(|p| p.snapshot_hash.clone())
        };

        let record = HashRecord {
            hash,
            module: module.to_string(),
            module_version: version.to_string(),
            previous_hash,
            snapshot_hash,
        };
        self.files.insert(path.clone(), record);
        &self.files[path]
    }

    /// Pin `hash` as the snapshot hash of a tracked file. Untracked paths
    /// are ignored.
    pub fn set_snapshot_hash(&mut self, path: &ProjectPath, hash: String) -> bool {
        match self.files.get_mut(path) {
            Some(record) => {
                record.snapshot_hash = Some(hash);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, path: &ProjectPath) -> Option<&HashRecord> {
        self.files.get(path)
    }

    pub fn remove(&mut self, path: &ProjectPath) -> Option<HashRecord> {
        self.files.remove(path)
    }

    /// Tracked files owned by `module`, in path order.
    pub fn files_for_module<'a>(
        &'a self,
        module: &'a str,
    ) -> impl Iterator<Item = (&'a ProjectPath, &'a HashRecord)> + 'a {
        self.files.iter().filter(move |(_, r)| r.module == module)
    }

    /// Distinct module slugs with at least one tracked file.
    pub fn modules(&self) -> Vec<String> {
        let mut out: Vec<String> = self.files.values().map(|r| r.module.clone()).collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProjectPath, &HashRecord)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> ProjectPath {
        ProjectPath::try_new(p).unwrap()
    }

    #[test]
    fn first_record_has_no_previous_hash() {
        let mut reg = HashRegistry::new();
        let rec = reg.record_file_hash(&path("a.py"), "free/x", "1.0.0", b"one", false);
        assert_eq!(rec.hash, content_hash(b"one"));
        assert_eq!(rec.previous_hash, None);
        assert_eq!(rec.snapshot_hash, None);
    }

    #[test]
    fn changed_content_tracks_previous_hash() {
        let mut reg = HashRegistry::new();
        reg.record_file_hash(&path("a.py"), "free/x", "1.0.0", b"one", false);
        let rec = reg.record_file_hash(&path("a.py"), "free/x", "1.1.0", b"two", false);
        assert_eq!(rec.previous_hash.as_deref(), Some(content_hash(b"one").as_str()));
        assert_eq!(rec.module_version, "1.1.0");
    }

    #[test]
    fn identical_rewrite_is_stable() {
        let mut reg = HashRegistry::new();
        reg.record_file_hash(&path("a.py"), "free/x", "1.0.0", b"one", false);
        let before = reg.clone();
        reg.record_file_hash(&path("a.py"), "free/x", "1.0.0", b"one", false);
        assert_eq!(reg, before);
    }

    #[test]
    fn snapshot_pins_hash() {
        let mut reg = HashRegistry::new();
        reg.record_file_hash(&path("a.py"), "free/x", "1.0.0", b"one", true);
        let rec = reg.record_file_hash(&path("a.py"), "free/x", "1.0.0", b"two", false);
        assert_eq!(rec.snapshot_hash.as_deref(), Some(content_hash(b"one").as_str()));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut reg = HashRegistry::new();
        reg.record_file_hash(&path("src/a.py"), "free/x", "1.0.0", b"one", false);
        let json = serde_json::to_value(&reg).unwrap();
        assert!(json.get("src/a.py").is_some());
        assert_eq!(reg.modules(), vec!["free/x".to_string()]);
    }
}
