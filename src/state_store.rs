use std::fs;
use std::fs::File;
use std::io;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use log::debug;
use log::info;
use log::warn;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::relay_types::PersistedSnapshot;
use crate::relay_types::RelayId;

/// On-disk record, one boolean per relay keyed by its channel number.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StateFile {
    #[serde(rename = "1")]
    relay1: bool,
    #[serde(rename = "2")]
    relay2: bool,
    #[serde(rename = "3")]
    relay3: bool,
    #[serde(rename = "4")]
    relay4: bool,
}

impl From<&PersistedSnapshot> for StateFile {
    fn from(snapshot: &PersistedSnapshot) -> Self {
        StateFile {
            relay1: snapshot.get(RelayId::Relay1),
            relay2: snapshot.get(RelayId::Relay2),
            relay3: snapshot.get(RelayId::Relay3),
            relay4: snapshot.get(RelayId::Relay4),
        }
    }
}

impl From<StateFile> for PersistedSnapshot {
    fn from(file: StateFile) -> Self {
        PersistedSnapshot::new([file.relay1, file.relay2, file.relay3, file.relay4])
    }
}

/// Why [`StateStore::load`] fell back to the all-off default.
#[derive(Debug, Error)]
pub enum RecoveryEvent {
    #[error("State file '{path}' not found, using defaults")]
    Missing { path: String },

    #[error("State file '{path}' is unreadable, using defaults: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("State file '{path}' is invalid, using defaults: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
#[error("Failed to save relay state to '{path}': {source}")]
pub struct PersistenceWriteFailure {
    path: String,
    #[source]
    source: io::Error,
}

impl PersistenceWriteFailure {
    pub fn new<S: Into<String>>(path: S, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[derive(Debug)]
pub struct LoadedSnapshot {
    pub snapshot: PersistedSnapshot,
    pub recovery: Option<RecoveryEvent>,
}

/// Durable home of the relay snapshot.
pub trait SnapshotStore {
    /// Never fails: anything unusable on disk yields the all-off default and a
    /// [`RecoveryEvent`].
    fn load(&self) -> LoadedSnapshot;

    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceWriteFailure>;
}

fn sync_directory(directory: &Path) -> io::Result<()> {
    File::open(directory)?.sync_all()
}

pub struct StateStore {
    path: PathBuf,
    sync_dir: fn(&Path) -> io::Result<()>,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> StateStore {
        StateStore {
            path: path.into(),
            sync_dir: sync_directory,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn write_atomically(&self, data: &[u8]) -> io::Result<()> {
        let directory = self.directory();
        let prefix = match self.path.file_name() {
            Some(name) => format!("{}.", name.to_string_lossy()),
            None => String::from("state."),
        };

        // dropping the temp file on any error below removes it
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&directory)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        // the rename is the commit point, the new snapshot is in place from
        // here on and the save must not be reported as failed
        if let Err(e) = (self.sync_dir)(&directory) {
            warn!(
                "Saved relay state to '{}' but syncing '{}' failed: {}",
                self.display_path(),
                directory.display(),
                e
            );
        }
        Ok(())
    }
}

impl SnapshotStore for StateStore {
    fn load(&self) -> LoadedSnapshot {
        let path = self.display_path();

        let recovery = match fs::read(&self.path) {
            Ok(data) => match decode(&data) {
                Ok(snapshot) => {
                    info!("Loaded relay state from '{}': {:?}", path, snapshot);
                    return LoadedSnapshot {
                        snapshot,
                        recovery: None,
                    };
                }
                Err(source) => RecoveryEvent::Invalid { path, source },
            },
            Err(e) if e.kind() == ErrorKind::NotFound => RecoveryEvent::Missing { path },
            Err(source) => RecoveryEvent::Unreadable { path, source },
        };

        match recovery {
            RecoveryEvent::Missing { .. } => info!("{}", recovery),
            _ => warn!("{}", recovery),
        }

        LoadedSnapshot {
            snapshot: PersistedSnapshot::all_off(),
            recovery: Some(recovery),
        }
    }

    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceWriteFailure> {
        let data = encode(snapshot)
            .map_err(|e| PersistenceWriteFailure::new(self.display_path(), e.into()))?;
        self.write_atomically(&data)
            .map_err(|e| PersistenceWriteFailure::new(self.display_path(), e))?;
        debug!("Saved relay state to '{}': {:?}", self.display_path(), snapshot);
        Ok(())
    }
}

pub fn encode(snapshot: &PersistedSnapshot) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(&StateFile::from(snapshot))
}

/// Decodes a stored snapshot. All or nothing: every relay must be present,
/// no other key may appear and every value must be a boolean.
pub fn decode(data: &[u8]) -> serde_json::Result<PersistedSnapshot> {
    serde_json::from_slice::<StateFile>(data).map(PersistedSnapshot::from)
}
