use crate::domain::payment::PaymentId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-payment mutual exclusion.
///
/// The repository does not serialize read-modify-write cycles, so saga-driven and
/// webhook-driven updates to the same payment take this lock around their
/// load, transition and persist steps. Different payments never contend.
#[derive(Default)]
pub struct PaymentLocks {
    slots: Mutex<HashMap<PaymentId, Arc<AsyncMutex<()>>>>,
}

impl PaymentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: &PaymentId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop slots nobody holds or waits on.
            slots.retain(|key, slot| key == id || Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        slot.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
