//! Process-wide single-install lock

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::InstallError;

/// Single-slot lock guarding every mutation of the installation trees
///
/// Clones share the same slot. Acquisition never waits: a busy lock is an
/// [`InstallError::AlreadyInProgress`].
#[derive(Debug, Clone)]
pub struct InstallLock {
    slot: Arc<Semaphore>,
}

/// Held for the duration of one operation; dropping it frees the slot
#[derive(Debug)]
pub struct InstallGuard {
    _permit: OwnedSemaphorePermit,
}

impl InstallLock {
    pub fn new() -> Self {
        Self { slot: Arc::new(Semaphore::new(1)) }
    }

    pub fn try_acquire(&self) -> Result<InstallGuard, InstallError> {
        self.slot
            .clone()
            .try_acquire_owned()
            .map(|permit| InstallGuard { _permit: permit })
            .map_err(|_| InstallError::AlreadyInProgress)
    }

    pub fn is_held(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

impl Default for InstallLock {
    fn default() -> Self {
        Self::new()
    }
}
