use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Process-scoped map of active calls, keyed by carrier call id. Used only
/// for lookup and cleanup; calls never coordinate through it. Each entry
/// carries a shutdown handle the owning connection task waits on, so the
/// service can end every live call on termination.
#[derive(Clone, Default)]
pub struct CallRegistry {
    inner: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call and returns its shutdown handle, or `None` if the id
    /// is already live: a duplicate start must not displace the existing
    /// session.
    pub fn insert(&self, call_sid: &str) -> Option<Arc<Notify>> {
        let mut calls = self.lock();
        if calls.contains_key(call_sid) {
            tracing::warn!("call {} is already registered", call_sid);
            return None;
        }
        let shutdown = Arc::new(Notify::new());
        calls.insert(call_sid.to_string(), shutdown.clone());
        Some(shutdown)
    }

    /// Removes a call. Idempotent: the stop signal and the transport close
    /// both try to clean up, and the second attempt simply finds nothing.
    pub fn remove(&self, call_sid: &str) -> bool {
        self.lock().remove(call_sid).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Signals every live call to end. Entries are removed by their owners
    /// as the calls wind down.
    pub fn shutdown_all(&self) {
        let calls = self.lock();
        tracing::info!("signalling shutdown to {} active call(s)", calls.len());
        for shutdown in calls.values() {
            shutdown.notify_one();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Notify>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_start_is_refused() {
        let registry = CallRegistry::new();
        assert!(registry.insert("CA1").is_some());
        assert!(registry.insert("CA1").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = CallRegistry::new();
        registry.insert("CA1");
        assert!(registry.remove("CA1"));
        assert!(!registry.remove("CA1"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_all_wakes_every_registered_call() {
        let registry = CallRegistry::new();
        let a = registry.insert("CA1").unwrap();
        let b = registry.insert("CA2").unwrap();

        registry.shutdown_all();

        // notify_one stores a permit, so these resolve even though the
        // waiters arrive after the signal.
        a.notified().await;
        b.notified().await;
    }
}
