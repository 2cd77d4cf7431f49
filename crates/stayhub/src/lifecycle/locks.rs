use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::domain::{BookingId, PropertyId, UserId};

/// Async mutual exclusion keyed by record, held across a check and the commit it guards.
///
/// Keys are namespaced (`property:`, `booking:`, `user:`). Callers that need more than one
/// key acquire them in that namespace order.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub type KeyGuard = OwnedMutexGuard<()>;

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn property(&self, id: &PropertyId) -> KeyGuard {
        self.acquire(format!("property:{id}")).await
    }

    pub async fn booking(&self, id: &BookingId) -> KeyGuard {
        self.acquire(format!("booking:{id}")).await
    }

    pub async fn user(&self, id: &UserId) -> KeyGuard {
        self.acquire(format!("user:{id}")).await
    }

    async fn acquire(&self, key: String) -> KeyGuard {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop idle entries so the map tracks only keys somebody holds or awaits.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let property = PropertyId::from("prop-1");
        let guard = locks.property(&property).await;

        let contender = {
            let locks = locks.clone();
            let property = property.clone();
            tokio::spawn(async move {
                let _guard = locks.property(&property).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished(), "second holder must wait");
        drop(guard);
        contender.await.expect("contender completes");
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _first = locks.property(&PropertyId::from("prop-1")).await;
        let _second = locks.property(&PropertyId::from("prop-2")).await;
        let _user = locks.user(&UserId::from("prop-1")).await;
    }

    #[tokio::test]
    async fn idle_slots_are_pruned() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.booking(&BookingId::from("bkg-1")).await;
        }
        let _guard = locks.booking(&BookingId::from("bkg-2")).await;
        assert_eq!(locks.tracked(), 1);
    }
}
