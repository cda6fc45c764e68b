//! Ordered listener registry keyed by id
//!
//! Notification works on a snapshot taken under the lock, so callbacks run
//! without holding it and may add or remove listeners (themselves included).
//! A listener removed while a notification is in flight can still see that
//! one delivery, never more.

use log::{debug, warn};
use parking_lot::Mutex;

pub struct ListenerRegistry<L: Clone> {
    name: &'static str,
    entries: Mutex<Vec<(String, L)>>,
}

impl<L: Clone> ListenerRegistry<L> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Add a listener. An existing id keeps its slot and gets the new callback.
    pub fn register(&self, id: &str, listener: L) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|(key, _)| key == id) {
            debug!("{}: replacing listener '{}'", self.name, id);
            entry.1 = listener;
        } else {
            debug!("{}: registered listener '{}'", self.name, id);
            entries.push((id.to_string(), listener));
        }
    }

    /// Remove a listener; unknown ids are reported and otherwise ignored
    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|(key, _)| key == id) {
            Some(index) => {
                entries.remove(index);
                debug!("{}: removed listener '{}'", self.name, id);
                true
            }
            None => {
                warn!("{}: no listener registered with id '{}'", self.name, id);
                false
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().iter().any(|(key, _)| key == id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Listeners in registration order
    pub fn snapshot(&self) -> Vec<L> {
        self.entries
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
