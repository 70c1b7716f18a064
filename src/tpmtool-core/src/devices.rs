//! Device registration, editing and removal.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument};

use crate::device::{validate_registration, Device, DeviceId};
use crate::error::TrustError;
use crate::store::DeviceStore;

/// Validating front end to the device store.
pub struct DeviceManager {
    store: Arc<dyn DeviceStore>,
}

impl DeviceManager {
    /// Create a manager over the given store.
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// All registered devices.
    pub async fn list_devices(&self) -> Result<Vec<Device>, TrustError> {
        self.store.list().await
    }

    /// Device list updates.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Device>> {
        self.store.subscribe()
    }

    /// Register a device with no baseline.
    ///
    /// # Errors
    ///
    /// `MissingFields` / `InvalidPublicKey` for bad input, `Persistence` if
    /// the store fails.
    #[instrument(skip(self, public_key))]
    pub async fn add_device(&self, name: &str, public_key: &str) -> Result<Device, TrustError> {
        let key = validate_registration(name, public_key)?;
        let device = self.store.insert(Device::new(name, key)).await?;
        info!(device_id = device.id, "Device registered");
        Ok(device)
    }

    /// Change the name and key of an existing device.
    ///
    /// The baseline and last success time are kept.
    ///
    /// # Errors
    ///
    /// Input errors as for [`DeviceManager::add_device`], `DeviceNotFound` if
    /// the device was removed meanwhile, `Persistence` on store failure.
    #[instrument(skip(self, public_key))]
    pub async fn edit_device(
        &self,
        id: DeviceId,
        name: &str,
        public_key: &str,
    ) -> Result<Device, TrustError> {
        let key = validate_registration(name, public_key)?;

        let mut device = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(TrustError::DeviceNotFound { id })?;
        device.name = name.to_string();
        device.public_key = key;

        if !self.store.update(&device).await? {
            return Err(TrustError::DeviceNotFound { id });
        }
        info!(device_id = id, "Device updated");
        Ok(device)
    }

    /// Remove a device and its baseline.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if there is nothing to delete, `Persistence` on
    /// store failure.
    #[instrument(skip(self))]
    pub async fn delete_device(&self, id: DeviceId) -> Result<(), TrustError> {
        let device = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(TrustError::DeviceNotFound { id })?;

        if !self.store.delete(&device).await? {
            return Err(TrustError::DeviceNotFound { id });
        }
        info!(device_id = id, "Device deleted");
        Ok(())
    }
}
