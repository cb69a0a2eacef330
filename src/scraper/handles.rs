//! Engine-side handles behind open pages, keyed by page id.
//!
//! A page id is reserved before the engine allocates anything for it. If the
//! `open` future is dropped before it hands the `Page` back, dropping the
//! reservation releases whatever was attached, so a cancelled load never
//! leaves a tab behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

enum Slot<T> {
    Loading,
    Ready(T),
}

pub struct PageHandles<T> {
    slots: Mutex<HashMap<u64, Slot<T>>>,
    next_id: AtomicU64,
    release: fn(T),
}

impl<T> PageHandles<T> {
    /// `release` runs for every handle whose reservation is dropped unkept.
    pub fn new(release: fn(T)) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            release,
        })
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<u64, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reserve(self: &Arc<Self>) -> Reservation<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots().insert(id, Slot::Loading);
        Reservation {
            handles: Arc::clone(self),
            id,
            armed: true,
        }
    }

    /// Attach the engine handle to a reserved id. The handle comes back as
    /// `Err` when the reservation is already gone; the caller then owns it.
    pub fn attach(&self, id: u64, handle: T) -> Result<(), T> {
        match self.slots().get_mut(&id) {
            Some(slot) => {
                *slot = Slot::Ready(handle);
                Ok(())
            }
            None => Err(handle),
        }
    }

    pub fn get(&self, id: u64) -> Option<T>
    where
        T: Clone,
    {
        match self.slots().get(&id) {
            Some(Slot::Ready(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Forget `id`, handing back its handle if one was attached.
    pub fn remove(&self, id: u64) -> Option<T> {
        match self.slots().remove(&id)? {
            Slot::Ready(handle) => Some(handle),
            Slot::Loading => None,
        }
    }

    /// Reserved ids, loaded or not.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots().len()
    }
}

/// A page id whose load has not been handed to the caller yet.
pub struct Reservation<T> {
    handles: Arc<PageHandles<T>>,
    id: u64,
    armed: bool,
}

impl<T> Reservation<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The page reached the caller; from now on `close` is responsible for it.
    pub fn keep(mut self) -> u64 {
        self.armed = false;
        self.id
    }
}

impl<T> Drop for Reservation<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(handle) = self.handles.remove(self.id) {
            (self.handles.release)(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    fn count_release(_: &'static str) {
        RELEASED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_reservation_lifecycle() {
        let handles = PageHandles::new(count_release);
        let before = RELEASED.load(Ordering::SeqCst);

        // Dropped while loading: nothing attached, nothing to release.
        drop(handles.reserve());
        assert_eq!(handles.len(), 0);

        // Dropped after the engine allocated: released.
        let pending = handles.reserve();
        handles.attach(pending.id(), "tab-2").unwrap();
        assert_eq!(handles.len(), 1);
        drop(pending);
        assert_eq!(handles.len(), 0);
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);

        // Kept: stays until removed, and removal does not release.
        let kept = handles.reserve();
        handles.attach(kept.id(), "tab-3").unwrap();
        let id = kept.keep();
        assert_eq!(handles.get(id), Some("tab-3"));
        assert_eq!(handles.remove(id), Some("tab-3"));
        assert_eq!(handles.len(), 0);
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_attach_after_abandon_hands_handle_back() {
        let handles = PageHandles::new(drop::<u32>);
        let pending = handles.reserve();
        let id = pending.id();
        drop(pending);

        assert_eq!(handles.attach(id, 7), Err(7));
        assert_eq!(handles.len(), 0);
    }
}
