use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Something that blocks until the next loop iteration is due.
pub trait Tick {
    fn wait(&mut self);
}

/// Fixed-rate sleeper. Deadlines advance by whole periods so the rate does
/// not drift; an overrun re-anchors on the current time instead of bursting.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, next: Instant::now() + period }
    }

    pub fn from_hz(hz: f32) -> Self {
        Self::new(Duration::from_secs_f32(1.0 / hz))
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Tick for Ticker {
    fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.next = now + self.period;
        }
    }
}

/// Cooperative stop flag, checked once per tick.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
