//! Device storage.
//!
//! The engine never owns device records; it reads a snapshot through a
//! [`DeviceStore`] for every operation. Writes are serialized by the store
//! implementation. Two stores are provided: an in-memory one and a JSON file
//! written atomically (temp file + rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace, warn};

use crate::device::{Device, DeviceId};
use crate::error::TrustError;

/// Keyed device storage with change notification.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// All devices in id order.
    async fn list(&self) -> Result<Vec<Device>, TrustError>;

    /// A snapshot of one device.
    async fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, TrustError>;

    /// Store a new device. The id on the input is ignored and a fresh one
    /// is assigned; the stored record is returned.
    async fn insert(&self, device: Device) -> Result<Device, TrustError>;

    /// Replace the record with the same id. Returns `false` if it is gone.
    async fn update(&self, device: &Device) -> Result<bool, TrustError>;

    /// Remove the record with the same id. Returns `false` if it is gone.
    async fn delete(&self, device: &Device) -> Result<bool, TrustError>;

    /// Receiver that yields the full device list after every change.
    fn subscribe(&self) -> watch::Receiver<Vec<Device>>;
}

/// Device table shared by both stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DeviceTable {
    next_id: DeviceId,
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceTable {
    fn snapshot(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    fn insert(&mut self, mut device: Device) -> Device {
        self.next_id = self.next_id.max(self.devices.keys().max().copied().unwrap_or(0)) + 1;
        device.id = self.next_id;
        self.devices.insert(device.id, device.clone());
        device
    }

    fn update(&mut self, device: &Device) -> bool {
        match self.devices.get_mut(&device.id) {
            Some(slot) => {
                *slot = device.clone();
                true
            },
            None => false,
        }
    }

    fn delete(&mut self, id: DeviceId) -> bool {
        self.devices.remove(&id).is_some()
    }
}

fn lock_poisoned() -> TrustError {
    TrustError::persistence("device table lock poisoned")
}

/// Volatile store, used by tests and when no store file is configured.
pub struct MemoryDeviceStore {
    table: RwLock<DeviceTable>,
    changes: watch::Sender<Vec<Device>>,
}

impl MemoryDeviceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            table: RwLock::new(DeviceTable::default()),
            changes,
        }
    }

    fn write<T>(&self, op: impl FnOnce(&mut DeviceTable) -> T) -> Result<T, TrustError> {
        let mut table = self.table.write().map_err(|_| lock_poisoned())?;
        let out = op(&mut table);
        self.changes.send_replace(table.snapshot());
        Ok(out)
    }
}

impl Default for MemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn list(&self) -> Result<Vec<Device>, TrustError> {
        let table = self.table.read().map_err(|_| lock_poisoned())?;
        Ok(table.snapshot())
    }

    async fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, TrustError> {
        let table = self.table.read().map_err(|_| lock_poisoned())?;
        Ok(table.devices.get(&id).cloned())
    }

    async fn insert(&self, device: Device) -> Result<Device, TrustError> {
        self.write(|t| t.insert(device))
    }

    async fn update(&self, device: &Device) -> Result<bool, TrustError> {
        self.write(|t| t.update(device))
    }

    async fn delete(&self, device: &Device) -> Result<bool, TrustError> {
        self.write(|t| t.delete(device.id))
    }

    fn subscribe(&self) -> watch::Receiver<Vec<Device>> {
        self.changes.subscribe()
    }
}

/// Store persisted as a single JSON document.
pub struct JsonFileStore {
    path: PathBuf,
    table: Mutex<DeviceTable>,
    changes: watch::Sender<Vec<Device>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// `Persistence` if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice::<DeviceTable>(&data).map_err(|e| {
                TrustError::persistence(format!("corrupt store {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store: no file yet, starting empty");
                DeviceTable::default()
            },
            Err(e) => {
                return Err(TrustError::persistence(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            },
        };

        debug!(
            path = %path.display(),
            devices = table.devices.len(),
            "Store: loaded device table"
        );

        let (changes, _) = watch::channel(table.snapshot());
        Ok(Self {
            path,
            table: Mutex::new(table),
            changes,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `op` to a copy of the table, persist it, then publish.
    /// The in-memory table only changes once the file was written.
    async fn write<T>(&self, op: impl FnOnce(&mut DeviceTable) -> T) -> Result<T, TrustError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let out = op(&mut next);

        self.persist(&next).await?;
        *table = next;
        self.changes.send_replace(table.snapshot());
        Ok(out)
    }

    async fn persist(&self, table: &DeviceTable) -> Result<(), TrustError> {
        let data = serde_json::to_vec_pretty(table)
            .map_err(|e| TrustError::persistence(format!("failed to serialize devices: {e}")))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                TrustError::persistence(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await.map_err(|e| {
            warn!(path = %tmp.display(), "Store: write failed: {}", e);
            TrustError::persistence(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            TrustError::persistence(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        trace!(bytes = data.len(), path = %self.path.display(), "Store: persisted");
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Device>, TrustError> {
        Ok(self.table.lock().await.snapshot())
    }

    async fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, TrustError> {
        Ok(self.table.lock().await.devices.get(&id).cloned())
    }

    async fn insert(&self, device: Device) -> Result<Device, TrustError> {
        self.write(|t| t.insert(device)).await
    }

    async fn update(&self, device: &Device) -> Result<bool, TrustError> {
        self.write(|t| t.update(device)).await
    }

    async fn delete(&self, device: &Device) -> Result<bool, TrustError> {
        self.write(|t| t.delete(device.id)).await
    }

    fn subscribe(&self) -> watch::Receiver<Vec<Device>> {
        self.changes.subscribe()
    }
}
