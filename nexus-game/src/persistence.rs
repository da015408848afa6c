//! Save slots: snapshot envelopes and the storage tiers that hold them.
//!
//! Every slot is stored as a JSON envelope whose payload is the serialized
//! [`Snapshot`] plus an XxHash64 checksum of that payload. Stores only move
//! envelope text around; encoding and verification live here.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use twox_hash::XxHash64;

use crate::constants::{CHECKSUM_SEED, SNAPSHOT_VERSION};
use crate::state::GameState;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("save slot {slot} failed its checksum")]
    Corrupt { slot: String },
    #[error("snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("invalid save slot name {0:?}")]
    InvalidSlot(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Everything needed to resume a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub state: GameState,
}

impl Snapshot {
    /// Capture the state at the current wall-clock time.
    #[must_use]
    pub fn capture(state: &GameState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timestamp: Utc::now(),
            state: state.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSlotInfo {
    pub slot: String,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SaveEnvelope {
    slot: String,
    timestamp: DateTime<Utc>,
    version: u32,
    checksum: String,
    payload: String,
}

fn checksum(payload: &str) -> String {
    let mut hasher = XxHash64::with_seed(CHECKSUM_SEED);
    hasher.write(payload.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Serialize a snapshot into envelope text for `slot`.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be serialized.
pub fn encode_envelope(slot: &str, snapshot: &Snapshot) -> Result<String, StorageError> {
    let payload = serde_json::to_string(snapshot)?;
    let envelope = SaveEnvelope {
        slot: slot.to_string(),
        timestamp: snapshot.timestamp,
        version: snapshot.version,
        checksum: checksum(&payload),
        payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Verify and decode envelope text.
///
/// # Errors
///
/// Returns [`StorageError::Corrupt`] on a checksum mismatch and
/// [`StorageError::UnsupportedVersion`] for snapshots newer than this build.
pub fn decode_envelope(slot: &str, raw: &str) -> Result<Snapshot, StorageError> {
    let envelope: SaveEnvelope = serde_json::from_str(raw).map_err(|err| {
        warn!("Unreadable save envelope | slot:{slot} {err}");
        StorageError::Corrupt {
            slot: slot.to_string(),
        }
    })?;
    if checksum(&envelope.payload) != envelope.checksum {
        warn!("Checksum mismatch | slot:{slot}");
        return Err(StorageError::Corrupt {
            slot: slot.to_string(),
        });
    }
    if envelope.version > SNAPSHOT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: envelope.version,
            supported: SNAPSHOT_VERSION,
        });
    }
    Ok(serde_json::from_str(&envelope.payload)?)
}

fn envelope_info(raw: &str) -> Result<SaveSlotInfo, StorageError> {
    let envelope: SaveEnvelope = serde_json::from_str(raw)?;
    Ok(SaveSlotInfo {
        slot: envelope.slot,
        timestamp: envelope.timestamp,
        version: envelope.version,
    })
}

/// A place save slots live.
pub trait SaveStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write `snapshot` into `slot`, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, slot: &str, snapshot: &Snapshot) -> Result<(), Self::Error>;

    /// Read a slot; `None` when it was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot exists but cannot be read back.
    fn load(&self, slot: &str) -> Result<Option<Snapshot>, Self::Error>;

    /// Remove a slot. Deleting a missing slot succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be removed.
    fn delete(&self, slot: &str) -> Result<(), Self::Error>;

    /// Every readable slot, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self) -> Result<Vec<SaveSlotInfo>, Self::Error>;
}

/// In-process store. Clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw envelope text of a slot.
    #[must_use]
    pub fn raw(&self, slot: &str) -> Option<String> {
        self.slots.borrow().get(slot).cloned()
    }

    /// Overwrite a slot with arbitrary text, bypassing encoding.
    pub fn insert_raw(&self, slot: &str, raw: String) {
        self.slots.borrow_mut().insert(slot.to_string(), raw);
    }
}

impl SaveStore for MemoryStore {
    type Error = StorageError;

    fn save(&self, slot: &str, snapshot: &Snapshot) -> Result<(), Self::Error> {
        let raw = encode_envelope(slot, snapshot)?;
        self.slots.borrow_mut().insert(slot.to_string(), raw);
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<Snapshot>, Self::Error> {
        self.raw(slot)
            .map(|raw| decode_envelope(slot, &raw))
            .transpose()
    }

    fn delete(&self, slot: &str) -> Result<(), Self::Error> {
        self.slots.borrow_mut().remove(slot);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SaveSlotInfo>, Self::Error> {
        self.slots
            .borrow()
            .values()
            .map(|raw| envelope_info(raw))
            .collect()
    }
}

/// One `<slot>.json` envelope per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

const SAVE_EXTENSION: &str = "json";

impl FileStore {
    /// The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> Result<PathBuf, StorageError> {
        let valid = !slot.is_empty()
            && slot
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(StorageError::InvalidSlot(slot.to_string()));
        }
        Ok(self.dir.join(format!("{slot}.{SAVE_EXTENSION}")))
    }
}

impl SaveStore for FileStore {
    type Error = StorageError;

    fn save(&self, slot: &str, snapshot: &Snapshot) -> Result<(), Self::Error> {
        let path = self.slot_path(slot)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, encode_envelope(slot, snapshot)?)?;
        debug!("Saved slot {slot} to {}", path.display());
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<Snapshot>, Self::Error> {
        let path = self.slot_path(slot)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        decode_envelope(slot, &raw).map(Some)
    }

    fn delete(&self, slot: &str) -> Result<(), Self::Error> {
        let path = self.slot_path(slot)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<SaveSlotInfo>, Self::Error> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut slots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SAVE_EXTENSION) {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(StorageError::from)
                .and_then(|raw| envelope_info(&raw))
            {
                Ok(info) => slots.push(info),
                Err(err) => warn!("Skipping unreadable save {} | {err}", path.display()),
            }
        }
        slots.sort_by(|a, b| a.slot.cmp(&b.slot));
        Ok(slots)
    }
}

/// Two-tier store: the primary first, the fallback whenever the primary fails.
#[derive(Debug, Clone)]
pub struct FallbackStore<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackStore<P, F>
where
    P: SaveStore<Error = StorageError>,
    F: SaveStore<Error = StorageError>,
{
    pub const fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    pub const fn primary(&self) -> &P {
        &self.primary
    }

    pub const fn fallback(&self) -> &F {
        &self.fallback
    }
}

impl<P, F> SaveStore for FallbackStore<P, F>
where
    P: SaveStore<Error = StorageError>,
    F: SaveStore<Error = StorageError>,
{
    type Error = StorageError;

    fn save(&self, slot: &str, snapshot: &Snapshot) -> Result<(), Self::Error> {
        self.primary.save(slot, snapshot).or_else(|err| {
            warn!("Primary save failed, using fallback | slot:{slot} {err}");
            self.fallback.save(slot, snapshot)
        })
    }

    /// A save that landed in the fallback while the primary was down can be
    /// newer than the primary's copy, so the later timestamp wins.
    fn load(&self, slot: &str) -> Result<Option<Snapshot>, Self::Error> {
        match self.primary.load(slot) {
            Ok(Some(snapshot)) => match self.fallback.load(slot) {
                Ok(Some(newer)) if newer.timestamp > snapshot.timestamp => {
                    debug!("Fallback copy is newer | slot:{slot}");
                    Ok(Some(newer))
                }
                Ok(_) => Ok(Some(snapshot)),
                Err(err) => {
                    warn!("Fallback load failed, keeping primary | slot:{slot} {err}");
                    Ok(Some(snapshot))
                }
            },
            Ok(None) => self.fallback.load(slot),
            Err(err @ StorageError::UnsupportedVersion { .. }) => Err(err),
            Err(err) => {
                warn!("Primary load failed, using fallback | slot:{slot} {err}");
                self.fallback.load(slot)
            }
        }
    }

    fn delete(&self, slot: &str) -> Result<(), Self::Error> {
        let primary = self.primary.delete(slot);
        let fallback = self.fallback.delete(slot);
        match (primary, fallback) {
            (Err(err), Err(_)) => Err(err),
            _ => Ok(()),
        }
    }

    fn list(&self) -> Result<Vec<SaveSlotInfo>, Self::Error> {
        let mut merged: BTreeMap<String, SaveSlotInfo> = BTreeMap::new();
        match self.fallback.list() {
            Ok(slots) => merged.extend(slots.into_iter().map(|info| (info.slot.clone(), info))),
            Err(err) => warn!("Fallback listing failed | {err}"),
        }
        match self.primary.list() {
            Ok(slots) => {
                for info in slots {
                    let stale = merged
                        .get(&info.slot)
                        .is_none_or(|existing| existing.timestamp <= info.timestamp);
                    if stale {
                        merged.insert(info.slot.clone(), info);
                    }
                }
            }
            Err(err) => warn!("Primary listing failed | {err}"),
        }
        Ok(merged.into_values().collect())
    }
}
