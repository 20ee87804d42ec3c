use std::{collections::BTreeMap, sync::Mutex};

use nanoid::nanoid;

/// Generated file ids are short enough to retype from a chat listing.
const FILE_ID_LEN: usize = 8;

/// Metadata for one announced file.
///
/// The record describes bytes that arrive later (or never) over the file
/// channel. `uploader` is a copied display name, so the record outlives the
/// uploading session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub filename: String,
    pub size_bytes: u64,
    pub uploader: String,
}

/// Shared-file metadata table, keyed by file id.
///
/// Records are immutable once stored and never evicted; the table lives as
/// long as the process.
#[derive(Default)]
pub struct FileRegistry {
    files: Mutex<BTreeMap<String, FileRecord>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stores a record under a freshly generated id and returns the id.
    ///
    /// Announcing only records metadata; telling the room about the share is
    /// the caller's job, which keeps this store free of routing concerns.
    pub fn announce(&self, filename: String, size_bytes: u64, uploader: String) -> String {
        let mut files = self.files.lock().unwrap();
        let mut id = nanoid!(FILE_ID_LEN);
        while files.contains_key(&id) {
            id = nanoid!(FILE_ID_LEN);
        }
        files.insert(
            id.clone(),
            FileRecord {
                filename,
                size_bytes,
                uploader,
            },
        );
        id
    }

    pub fn lookup(&self, file_id: &str) -> Option<FileRecord> {
        self.files.lock().unwrap().get(file_id).cloned()
    }

    /// Stable copy of every record in id order.
    pub fn list_all(&self) -> Vec<(String, FileRecord)> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }
}

/// Formats a byte count the way the chat listings show it.
pub fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn announce_then_lookup_round_trips_the_record() {
        let registry = FileRegistry::new();
        let id = registry.announce("a.txt".into(), 2048, "alice".into());

        let record = registry.lookup(&id).expect("record should exist");
        assert_eq!(record.filename, "a.txt");
        assert_eq!(record.size_bytes, 2048);
        assert_eq!(record.uploader, "alice");

        let listed = registry.list_all();
        assert!(listed.iter().any(|(listed_id, _)| *listed_id == id));
    }

    #[test]
    fn announce_issues_fresh_ids() {
        let registry = FileRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let id = registry.announce("a.txt".into(), 1, "alice".into());
            assert!(seen.insert(id), "id issued twice");
        }
    }

    #[test]
    fn lookup_of_unknown_id_is_none() {
        let registry = FileRegistry::new();
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn list_all_returns_records_in_id_order() {
        let registry = FileRegistry::new();
        registry.announce("one.txt".into(), 1, "alice".into());
        registry.announce("two.txt".into(), 2, "bob".into());

        let listed = registry.list_all();
        assert_eq!(listed.len(), 2);
        let mut ids: Vec<String> = listed.iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        assert_eq!(
            ids,
            listed.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn human_size_matches_listing_format() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1024), "1.0 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(1024 * 1024), "1.0 MB");
        assert_eq!(human_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
