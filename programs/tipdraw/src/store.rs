use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anchor_lang::prelude::*;
use chrono::Utc;

use crate::{constants::BACKUP_RETENTION, error::DrawError, state::Document};

/// Per-guild document persistence.
///
/// `load` never fails for a merely corrupt document: it falls back to the
/// newest readable backup, then to a fresh default. `save` reports failure
/// as `false` so callers can log it and carry on.
pub trait DocumentStore: Send + Sync {
    fn load(&self, guild_id: u64) -> Result<Document>;
    fn save(&self, guild_id: u64, document: &Document) -> bool;
    /// Snapshots the current document without changing it.
    fn backup(&self, guild_id: u64) -> bool;
}

fn parse_document(raw: &str) -> Option<Document> {
    serde_json::from_str::<Document>(raw).ok().map(Document::migrate)
}

/// One JSON file per guild under `root`, with timestamped backups in
/// `root/backups/<guild>/`.
pub struct JsonFileStore {
    root: PathBuf,
    // Orders backups taken within the same microsecond
    sequence: AtomicU64,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("backups")).map_err(|err| {
            msg!("cannot create data directory {}: {}", root.display(), err);
            DrawError::StoreUnavailable
        })?;
        Ok(JsonFileStore {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    fn document_path(&self, guild_id: u64) -> PathBuf {
        self.root.join(format!("{guild_id}.json"))
    }

    fn backup_dir(&self, guild_id: u64) -> PathBuf {
        self.root.join("backups").join(guild_id.to_string())
    }

    /// Backup files for a guild, oldest first.
    pub fn backups(&self, guild_id: u64) -> Vec<PathBuf> {
        let Ok(listing) = fs::read_dir(self.backup_dir(guild_id)) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths
    }

    fn copy_to_backup(&self, guild_id: u64, source: &Path) -> std::io::Result<()> {
        let dir = self.backup_dir(guild_id);
        fs::create_dir_all(&dir)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        fs::copy(source, dir.join(format!("{stamp}-{sequence:06}.json")))?;

        let backups = self.backups(guild_id);
        if backups.len() > BACKUP_RETENTION {
            for stale in &backups[..backups.len() - BACKUP_RETENTION] {
                fs::remove_file(stale)?;
            }
        }
        Ok(())
    }

    fn write_atomically(&self, guild_id: u64, document: &Document) -> std::io::Result<()> {
        let path = self.document_path(guild_id);
        let staging = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(document)?;
        fs::write(&staging, body)?;
        fs::rename(&staging, &path)
    }

    fn restore_from_backup(&self, guild_id: u64) -> Option<Document> {
        self.backups(guild_id).iter().rev().find_map(|path| {
            let document = fs::read_to_string(path).ok().and_then(|raw| parse_document(&raw))?;
            msg!("guild {} restored from backup {}", guild_id, path.display());
            Some(document)
        })
    }

    /// Writes a fresh default document; a second failure means the store is unusable.
    fn bootstrap(&self, guild_id: u64) -> Result<Document> {
        let document = Document::default();
        for attempt in 1..=2 {
            match self.write_atomically(guild_id, &document) {
                Ok(()) => return Ok(document),
                Err(err) => msg!("bootstrap attempt {} for guild {} failed: {}", attempt, guild_id, err),
            }
        }
        Err(DrawError::StoreUnavailable.into())
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self, guild_id: u64) -> Result<Document> {
        let path = self.document_path(guild_id);
        if !path.exists() {
            return self.bootstrap(guild_id);
        }

        let parsed = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| parse_document(&raw));
        if let Some(document) = parsed {
            for violation in document.check_invariants() {
                msg!("guild {}: {}", guild_id, violation);
            }
            return Ok(document);
        }

        msg!("guild {} document is unreadable, trying backups", guild_id);
        match self.restore_from_backup(guild_id) {
            Some(document) => {
                if let Err(err) = self.write_atomically(guild_id, &document) {
                    msg!("could not rewrite restored document for {}: {}", guild_id, err);
                }
                Ok(document)
            }
            None => self.bootstrap(guild_id),
        }
    }

    fn save(&self, guild_id: u64, document: &Document) -> bool {
        let path = self.document_path(guild_id);
        if path.exists() {
            if let Err(err) = self.copy_to_backup(guild_id, &path) {
                msg!("backup before save failed for guild {}: {}", guild_id, err);
            }
        }
        match self.write_atomically(guild_id, document) {
            Ok(()) => true,
            Err(err) => {
                msg!("saving guild {} failed: {}", guild_id, err);
                false
            }
        }
    }

    fn backup(&self, guild_id: u64) -> bool {
        let path = self.document_path(guild_id);
        if !path.exists() {
            return true;
        }
        match self.copy_to_backup(guild_id, &path) {
            Ok(()) => true,
            Err(err) => {
                msg!("backup failed for guild {}: {}", guild_id, err);
                false
            }
        }
    }
}

/// In-process store holding serialized documents, for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<u64, String>>,
    backups: Mutex<HashMap<u64, Vec<String>>>,
}

impl MemoryStore {
    pub fn backup_count(&self, guild_id: u64) -> usize {
        let backups = self.backups.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        backups.get(&guild_id).map_or(0, Vec::len)
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, guild_id: u64) -> Result<Document> {
        let documents = self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(documents
            .get(&guild_id)
            .and_then(|raw| parse_document(raw))
            .unwrap_or_default())
    }

    fn save(&self, guild_id: u64, document: &Document) -> bool {
        let Ok(raw) = serde_json::to_string(document) else {
            return false;
        };
        let mut documents = self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = documents.insert(guild_id, raw) {
            let mut backups = self.backups.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            backups.entry(guild_id).or_default().push(previous);
        }
        true
    }

    fn backup(&self, guild_id: u64) -> bool {
        let documents = self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(current) = documents.get(&guild_id) {
            let mut backups = self.backups.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            backups.entry(guild_id).or_default().push(current.clone());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn scratch_store() -> (JsonFileStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("tipdraw-{}", Uuid::new_v4()));
        (JsonFileStore::open(&root).unwrap(), root)
    }

    #[test]
    fn first_load_creates_default_document() {
        let (store, root) = scratch_store();
        let document = store.load(1).unwrap();
        assert_eq!(document, Document::default());
        assert!(root.join("1.json").exists());
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn save_backs_up_previous_state() {
        let (store, root) = scratch_store();
        let mut document = store.load(1).unwrap();
        document.user_mut(5, "ann").total_donated = 3.0;
        assert!(store.save(1, &document));
        assert_eq!(store.backups(1).len(), 1);

        let reloaded = store.load(1).unwrap();
        assert_eq!(reloaded.users[&5].total_donated, 3.0);
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn corrupt_document_falls_back_to_newest_backup() {
        let (store, root) = scratch_store();
        let mut document = store.load(1).unwrap();
        document.user_mut(5, "ann").total_donated = 3.0;
        store.save(1, &document);
        document.user_mut(5, "ann").total_donated = 8.0;
        store.save(1, &document);

        fs::write(root.join("1.json"), "{ not json").unwrap();
        let restored = store.load(1).unwrap();
        assert_eq!(restored.users[&5].total_donated, 3.0);
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn corrupt_document_without_backups_regenerates_default() {
        let (store, root) = scratch_store();
        fs::write(root.join("2.json"), "garbage").unwrap();
        assert_eq!(store.load(2).unwrap(), Document::default());
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn backups_are_pruned() {
        let (store, root) = scratch_store();
        let document = store.load(1).unwrap();
        for _ in 0..(BACKUP_RETENTION + 3) {
            store.save(1, &document);
        }
        assert_eq!(store.backups(1).len(), BACKUP_RETENTION);
        fs::remove_dir_all(root).ok();
    }
}
