use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use pilot_proto::{AltitudeReading, VehicleState};

/// Single-value cell written by a transport thread and read by the tick loop.
/// Every read sees a whole value; writers replace under the lock.
#[derive(Debug)]
pub struct LatestSnapshot<T> {
    inner: Mutex<Slot<T>>,
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    updated: Option<Instant>,
}

impl<T: Clone> LatestSnapshot<T> {
    pub fn new(initial: T) -> Self {
        Self { inner: Mutex::new(Slot { value: initial, updated: None }) }
    }

    /// Store a freshly arrived value.
    pub fn replace(&self, value: T) {
        let mut slot = self.lock();
        slot.value = value;
        slot.updated = Some(Instant::now());
    }

    /// Adjust the stored value in place. Does not count as an arrival, so
    /// `age()` keeps measuring from the last `replace`.
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        let mut slot = self.lock();
        f(&mut slot.value);
    }

    /// Apply `f` only if the last `replace` is older than `max_age`. The age
    /// check and the change happen under one lock, so a value arriving in
    /// between is never overwritten. Returns what `f` returned, or false when
    /// the value was fresh or never set.
    pub fn modify_if_stale(&self, max_age: Duration, f: impl FnOnce(&mut T) -> bool) -> bool {
        let mut slot = self.lock();
        match slot.updated {
            Some(t) if t.elapsed() > max_age => f(&mut slot.value),
            _ => false,
        }
    }

    pub fn read(&self) -> T {
        self.lock().value.clone()
    }

    /// Time since the last `replace`, or None if nothing has arrived yet.
    pub fn age(&self) -> Option<Duration> {
        self.lock().updated.map(|t| t.elapsed())
    }

    // Slot holds plain values, so a panic elsewhere cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Default> Default for LatestSnapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Telemetry cells shared between the FC reader (writer) and the mission (reader).
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub vehicle: Arc<LatestSnapshot<VehicleState>>,
    pub altitude: Arc<LatestSnapshot<AltitudeReading>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }
}
