//! Single-value shared state with snapshot reads, atomic functional updates
//! and change subscription.

use tokio::sync::watch;

/// Shared state holding one value.
///
/// Reads return an owned snapshot. Writes hand the updater the latest value
/// and replace it with whatever the updater returns; concurrent writers are
/// applied one at a time in the order they acquire the store, so no update
/// is ever computed from a stale copy.
pub struct SharedState<T> {
    tx: watch::Sender<T>,
}

impl<T> SharedState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current snapshot
    pub fn read(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value with `updater(latest)` and return the new snapshot.
    ///
    /// Subscribers are notified only when the value actually changed.
    pub fn write<F>(&self, updater: F) -> T
    where
        F: FnOnce(&T) -> T,
    {
        let mut snapshot = None;
        self.tx.send_if_modified(|current| {
            let next = updater(current);
            let changed = next != *current;
            *current = next;
            snapshot = Some(current.clone());
            changed
        });
        snapshot.unwrap_or_else(|| self.read())
    }

    /// Receiver notified after every effective write
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Derived view that only wakes up when `project(state)` changes
    pub fn select<P, F>(&self, project: F) -> Selector<T, P, F>
    where
        P: Clone + PartialEq,
        F: Fn(&T) -> P,
    {
        Selector::new(self.subscribe(), project)
    }
}

impl<T> Default for SharedState<T>
where
    T: Clone + Default + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Projection of a [`SharedState`]
pub struct Selector<T, P, F> {
    rx: watch::Receiver<T>,
    project: F,
    last: P,
}

impl<T, P, F> Selector<T, P, F>
where
    P: Clone + PartialEq,
    F: Fn(&T) -> P,
{
    fn new(mut rx: watch::Receiver<T>, project: F) -> Self {
        let last = {
            let state = rx.borrow_and_update();
            project(&state)
        };
        Self { rx, project, last }
    }

    /// Last observed projection
    pub fn get(&self) -> &P {
        &self.last
    }

    /// Wait for the projection to change.
    ///
    /// Returns `None` once the state has been dropped.
    pub async fn changed(&mut self) -> Option<P> {
        loop {
            self.rx.changed().await.ok()?;
            let next = {
                let state = self.rx.borrow_and_update();
                (self.project)(&state)
            };
            if next != self.last {
                self.last = next.clone();
                return Some(next);
            }
        }
    }
}
