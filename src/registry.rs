//! Device lifecycle: id allocation and lookup.
//!
//! Consumers hold device ids, not references; every operation resolves the
//! id through the registry and gets `NotFound` once the device has been
//! detached. A registry is created at process start-up and torn down with
//! [`DeviceRegistry::shutdown_all`] before exit.

use crate::config::InitialConfig;
use crate::device::{SimTempDevice, Trigger};
use crate::error::DeviceError;
use heapless::{FnvIndexMap, Vec};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::info;

/// Maximum number of simultaneously attached devices.
pub const MAX_DEVICES: usize = 8;

/// Hands out the lowest free id in `[0, MAX_DEVICES)`.
#[derive(Debug, Default)]
pub struct IdAllocator {
    in_use: Vec<u32, MAX_DEVICES>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self) -> Option<u32> {
        let id = (0..MAX_DEVICES as u32).find(|id| !self.in_use.contains(id))?;
        self.in_use.push(id).ok()?;
        Some(id)
    }

    /// Returns `false` if `id` was not allocated.
    pub fn release(&mut self, id: u32) -> bool {
        match self.in_use.iter().position(|&used| used == id) {
            Some(index) => {
                self.in_use.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    ids: IdAllocator,
    devices: FnvIndexMap<u32, Arc<SimTempDevice>, MAX_DEVICES>,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock()
    }

    /// Attaches a periodically sampling device and returns its id.
    pub fn attach(&self, initial: &InitialConfig) -> Result<u32, DeviceError> {
        self.attach_with(initial, Trigger::Periodic)
    }

    pub fn attach_with(&self, initial: &InitialConfig, trigger: Trigger) -> Result<u32, DeviceError> {
        let mut inner = self.lock();
        let id = inner.ids.acquire().ok_or(DeviceError::NoSpace)?;

        let device = match SimTempDevice::build(id, initial, trigger) {
            Ok(device) => Arc::new(device),
            Err(e) => {
                inner.ids.release(id);
                return Err(e);
            }
        };

        if inner.devices.insert(id, device).is_err() {
            inner.ids.release(id);
            return Err(DeviceError::NoSpace);
        }
        Ok(id)
    }

    pub fn get(&self, id: u32) -> Result<Arc<SimTempDevice>, DeviceError> {
        self.lock()
            .devices
            .get(&id)
            .cloned()
            .ok_or(DeviceError::NotFound(id))
    }

    /// Removes the device, releases its id and shuts it down. Readers still
    /// blocked on it are woken and see `Closed` once it is drained.
    pub fn detach(&self, id: u32) -> Result<(), DeviceError> {
        let device = {
            let mut inner = self.lock();
            let device = inner.devices.remove(&id).ok_or(DeviceError::NotFound(id))?;
            inner.ids.release(id);
            device
        };

        device.shutdown();
        info!(device = device.name(), "device detached");
        Ok(())
    }

    /// Attached ids in ascending order.
    pub fn ids(&self) -> Vec<u32, MAX_DEVICES> {
        let mut ids: Vec<u32, MAX_DEVICES> = self.lock().devices.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown_all(&self) {
        for id in self.ids() {
            // Concurrent detach already handled it.
            let _ = self.detach(id);
        }
    }
}
