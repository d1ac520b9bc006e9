use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use clock_proto::{AlarmBook, ClockReading};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

pub const OVERRIDE_SLOT: &str = "override-time";
pub const ALARMS_SLOT: &str = "alarms";

/// Named slots holding serialized records
pub trait StateStore: Send + Sync + 'static {
    fn read(&self, slot: &str) -> std::io::Result<Option<Vec<u8>>>;
    fn write(&self, slot: &str, bytes: &[u8]) -> std::io::Result<()>;
    fn remove(&self, slot: &str) -> std::io::Result<()>;
}

/// One JSON file per slot inside a directory
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }
}

impl StateStore for FileStore {
    fn read(&self, slot: &str) -> std::io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.slot_path(slot)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, slot: &str, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.slot_path(slot);
        // readers never see a half written record
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)
    }

    fn remove(&self, slot: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.slot_path(slot)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Keeps state for the lifetime of the process only
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Vec<u8>>>,
}

impl StateStore for MemoryStore {
    fn read(&self, slot: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.slots().get(slot).cloned())
    }

    fn write(&self, slot: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.slots().insert(slot.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, slot: &str) -> std::io::Result<()> {
        self.slots().remove(slot);
        Ok(())
    }
}

impl MemoryStore {
    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.slots.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

/// The store for an optional state directory
pub fn open(path: Option<&Path>) -> Box<dyn StateStore> {
    match path {
        Some(dir) => {
            debug!(?dir, "persisting clock state");
            Box::new(FileStore::new(dir))
        }
        None => Box::<MemoryStore>::default(),
    }
}

fn load<T: DeserializeOwned>(store: &dyn StateStore, slot: &str) -> Option<T> {
    let bytes = match store.read(slot) {
        Ok(bytes) => bytes?,
        Err(error) => {
            warn!(slot, ?error, "could not read persisted state, using defaults");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(slot, %error, "ignoring corrupt persisted state");
            None
        }
    }
}

fn save<T: Serialize>(store: &dyn StateStore, slot: &str, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.write(slot, &bytes)
}

/// Persisted override and alarms. Missing or corrupt records read as empty.
pub fn load_state(store: &dyn StateStore) -> (Option<ClockReading>, AlarmBook) {
    let override_time = load(store, OVERRIDE_SLOT);
    let alarms = load(store, ALARMS_SLOT).unwrap_or_default();
    (override_time, alarms)
}

pub fn save_override(
    store: &dyn StateStore,
    override_time: Option<ClockReading>,
) -> std::io::Result<()> {
    match override_time {
        Some(reading) => save(store, OVERRIDE_SLOT, &reading),
        None => store.remove(OVERRIDE_SLOT),
    }
}

pub fn save_alarms(store: &dyn StateStore, alarms: &AlarmBook) -> std::io::Result<()> {
    save(store, ALARMS_SLOT, alarms)
}

#[cfg(test)]
mod tests {
    use clock_proto::Alarm;

    use super::*;

    fn sample_book() -> AlarmBook {
        let mut book = AlarmBook::new();
        book.add(Alarm::new(7, 0).unwrap()).unwrap();
        book.add(Alarm::new(8, 0).unwrap()).unwrap();
        book
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let override_time = ClockReading::new(23, 59, 58).unwrap();

        {
            let store = FileStore::new(dir.path());
            save_override(&store, Some(override_time)).unwrap();
            save_alarms(&store, &sample_book()).unwrap();
        }

        let store = FileStore::new(dir.path());
        let (loaded_override, loaded_alarms) = load_state(&store);
        assert_eq!(loaded_override, Some(override_time));
        assert_eq!(loaded_alarms, sample_book());
        assert!(!dir.path().join("alarms.json.tmp").exists());
    }

    #[test]
    fn clearing_override_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        save_override(&store, Some(ClockReading::MIDNIGHT)).unwrap();
        assert!(dir.path().join("override-time.json").exists());

        save_override(&store, None).unwrap();
        assert!(!dir.path().join("override-time.json").exists());
        // removing twice is fine
        save_override(&store, None).unwrap();
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("state"));
        save_alarms(&store, &sample_book()).unwrap();
        assert_eq!(load_state(&store).1, sample_book());
    }

    #[test]
    fn missing_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (override_time, alarms) = load_state(&FileStore::new(dir.path()));
        assert_eq!(override_time, None);
        assert!(alarms.is_empty());
    }

    #[test]
    fn corrupt_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("override-time.json"), "{\"hour\": 99}").unwrap();
        std::fs::write(dir.path().join("alarms.json"), "not json").unwrap();

        let (override_time, alarms) = load_state(&FileStore::new(dir.path()));
        assert_eq!(override_time, None);
        assert!(alarms.is_empty());
    }

    #[test]
    fn accepts_browser_field_names() {
        let store = MemoryStore::default();
        store
            .write(OVERRIDE_SLOT, br#"{"hora": 6, "minuto": 30, "segundo": 15}"#)
            .unwrap();

        let (override_time, _) = load_state(&store);
        assert_eq!(override_time, Some(ClockReading::new(6, 30, 15).unwrap()));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = open(None);
        save_alarms(store.as_ref(), &sample_book()).unwrap();
        save_override(store.as_ref(), Some(ClockReading::MIDNIGHT)).unwrap();

        let (override_time, alarms) = load_state(store.as_ref());
        assert_eq!(override_time, Some(ClockReading::MIDNIGHT));
        assert_eq!(alarms.active(), Some(Alarm::new(7, 0).unwrap()));
    }
}
