use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Observable single-value cell. Every change is pushed to all live
/// subscribers; a new subscriber first receives the current value.
pub struct Watch<T: Clone> {
    inner: Mutex<WatchInner<T>>,
}

struct WatchInner<T> {
    value: T,
    subscribers: Vec<Sender<T>>,
}

impl<T: Clone> Watch<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(WatchInner {
                value,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WatchInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    pub fn set(&self, value: T) {
        self.replace(value);
    }

    /// Stores `value`, broadcasts it and hands back the previous value.
    pub fn replace(&self, value: T) -> T {
        let mut inner = self.lock();
        let previous = std::mem::replace(&mut inner.value, value);
        let current = inner.value.clone();
        inner
            .subscribers
            .retain(|tx| tx.send(current.clone()).is_ok());
        previous
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        let mut inner = self.lock();
        if tx.send(inner.value.clone()).is_ok() {
            inner.subscribers.push(tx);
        }
        rx
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}
