//! Latest-value broadcasting.
//!
//! `LatestValue` holds the most recent value and fans updates out to any
//! number of `LiveValue` subscribers. A subscriber that arrives late still
//! sees the current value first (replay-latest), then every later update in
//! publish order. Intermediate values may be coalesced for slow subscribers,
//! but never reordered.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out")]
    TimedOut,
    #[error("publisher went away")]
    Closed,
}

/// Publisher side
#[derive(Debug)]
pub struct LatestValue<T> {
    tx: watch::Sender<T>,
}

impl<T> LatestValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the value and notify subscribers
    pub fn publish(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Replace the value only if it differs; returns whether subscribers were notified
    pub fn publish_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        self.tx.send_if_modified(|current| {
            if *current != value {
                *current = value;
                true
            } else {
                false
            }
        })
    }

    /// Edit in place; `modify` returns whether anything changed
    pub fn modify<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        self.tx.send_if_modified(modify)
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> LiveValue<T> {
        LiveValue::new(self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Subscriber side
#[derive(Debug)]
pub struct LiveValue<T> {
    rx: watch::Receiver<T>,
    replayed: bool,
}

impl<T> Clone for LiveValue<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            replayed: false,
        }
    }
}

impl<T> LiveValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(rx: watch::Receiver<T>) -> Self {
        Self {
            rx,
            replayed: false,
        }
    }

    /// A live value that never changes
    pub fn constant(value: T) -> Self {
        let (_tx, rx) = watch::channel(value);
        Self::new(rx)
    }

    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Next value. The first call returns the current value immediately;
    /// later calls wait for a publish. `None` once the publisher is gone and
    /// everything has been seen.
    pub async fn next(&mut self) -> Option<T> {
        if !self.replayed {
            self.replayed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Treat the current value as seen; `next` then waits for a publish
    pub fn skip_current(&mut self) {
        self.rx.borrow_and_update();
        self.replayed = true;
    }

    /// Wait until `predicate` holds for the current or a future value
    pub async fn wait_until<F>(&mut self, timeout: Duration, predicate: F) -> Result<T, WaitError>
    where
        F: FnMut(&T) -> bool,
    {
        self.replayed = true;
        match tokio::time::timeout(timeout, self.rx.wait_for(predicate)).await {
            Ok(Ok(value)) => Ok(value.clone()),
            Ok(Err(_)) => Err(WaitError::Closed),
            Err(_) => Err(WaitError::TimedOut),
        }
    }

    /// Whether the publisher has been dropped
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Derived live value. Updates are forwarded by a background task that
    /// stops when either side goes away; equal derived values are not
    /// re-published.
    pub fn map<U, F>(self, f: F) -> LiveValue<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + 'static,
    {
        let mut source = self.rx;
        let initial = f(&source.borrow_and_update());
        let (tx, rx) = watch::channel(initial);

        tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    res = source.changed() => res.is_ok(),
                    _ = tx.closed() => false,
                };
                if !changed {
                    break;
                }
                let next = f(&source.borrow_and_update());
                tx.send_if_modified(|current| {
                    if *current != next {
                        *current = next;
                        true
                    } else {
                        false
                    }
                });
            }
        });

        LiveValue::new(rx)
    }
}
