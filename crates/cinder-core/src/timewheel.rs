//! Timing wheel for deferred, cancellable tasks.
//!
//! A fixed ring of one-second slots; each slot holds the tasks due on
//! that tick, keyed by a caller-chosen stable name. A `name → slot`
//! index makes `cancel` O(1) regardless of how far out the task sits.
//! Re-registering a name replaces the pending task; cancelling an
//! unknown name is a no-op.
//!
//! The process-wide wheel (`delay` / `at` / `cancel`) runs one ticker
//! thread, which also executes due callbacks; callbacks must be short
//! (the expiration tasks take a stripe lock, check, remove).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// One hour of one-second ticks.
const WHEEL_SLOTS: usize = 3600;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    /// Full wheel rotations remaining before the task is due.
    rotations: usize,
    callback: Callback,
}

/// A bucketed timer wheel.
pub struct TimeWheel {
    slots: Vec<Mutex<HashMap<String, Task>>>,
    index: DashMap<String, usize>,
    current: AtomicUsize,
    interval: Duration,
}

impl TimeWheel {
    /// Creates a wheel with the given tick interval and slot count.
    pub fn new(interval: Duration, slots: usize) -> Self {
        Self {
            slots: (0..slots).map(|_| Mutex::new(HashMap::new())).collect(),
            index: DashMap::new(),
            current: AtomicUsize::new(0),
            interval,
        }
    }

    /// Schedules `callback` to run after `delay`, under `name`.
    /// An existing task with the same name is replaced.
    pub fn delay(&self, delay: Duration, name: &str, callback: impl FnOnce() + Send + 'static) {
        // round up so a sub-tick delay still waits one full tick
        let ticks = delay
            .as_nanos()
            .div_ceil(self.interval.as_nanos())
            .max(1) as usize;

        self.cancel(name);

        let current = self.current.load(Ordering::Acquire);
        let slot = (current + ticks) % self.slots.len();
        let rotations = ticks / self.slots.len();

        {
            let mut bucket = self.slots[slot].lock().expect("wheel slot poisoned");
            bucket.insert(
                name.to_owned(),
                Task {
                    rotations,
                    callback: Box::new(callback),
                },
            );
        }
        // index updated outside the slot lock; cancel takes them in the
        // same order (index first, then slot)
        self.index.insert(name.to_owned(), slot);
    }

    /// Schedules `callback` to run at the given instant (next tick if
    /// the instant has already passed).
    pub fn at(&self, when: Instant, name: &str, callback: impl FnOnce() + Send + 'static) {
        let delay = when.saturating_duration_since(Instant::now());
        self.delay(delay, name, callback);
    }

    /// Cancels the task registered under `name`. Unknown names are a
    /// no-op. Returns whether a task was removed.
    pub fn cancel(&self, name: &str) -> bool {
        let Some((_, slot)) = self.index.remove(name) else {
            return false;
        };
        let mut bucket = self.slots[slot].lock().expect("wheel slot poisoned");
        bucket.remove(name).is_some()
    }

    /// Advances the wheel one slot, running every task that came due.
    fn tick(&self) {
        let current = self.current.load(Ordering::Acquire);
        let slot = (current + 1) % self.slots.len();
        self.current.store(slot, Ordering::Release);

        let due: Vec<(String, Callback)> = {
            let mut bucket = self.slots[slot].lock().expect("wheel slot poisoned");
            let names: Vec<String> = bucket
                .iter()
                .filter(|(_, task)| task.rotations == 0)
                .map(|(name, _)| name.clone())
                .collect();

            for task in bucket.values_mut() {
                if task.rotations > 0 {
                    task.rotations -= 1;
                }
            }

            names
                .into_iter()
                .filter_map(|name| bucket.remove(&name).map(|task| (name, task.callback)))
                .collect()
        };

        for (name, callback) in due {
            self.index.remove(&name);
            debug!(task = %name, "timewheel task fired");
            callback();
        }
    }

    /// Spawns the ticker thread driving this wheel.
    fn start(self: &Arc<Self>) {
        let wheel = Arc::clone(self);
        std::thread::Builder::new()
            .name("timewheel".into())
            .spawn(move || loop {
                std::thread::sleep(wheel.interval);
                wheel.tick();
            })
            .expect("spawn timewheel thread");
    }
}

fn wheel() -> &'static Arc<TimeWheel> {
    static WHEEL: OnceLock<Arc<TimeWheel>> = OnceLock::new();
    WHEEL.get_or_init(|| {
        let wheel = Arc::new(TimeWheel::new(Duration::from_secs(1), WHEEL_SLOTS));
        wheel.start();
        wheel
    })
}

/// Schedules a named task on the process-wide wheel.
pub fn delay(d: Duration, name: &str, callback: impl FnOnce() + Send + 'static) {
    wheel().delay(d, name, callback);
}

/// Schedules a named task on the process-wide wheel for an instant.
pub fn at(when: Instant, name: &str, callback: impl FnOnce() + Send + 'static) {
    wheel().at(when, name, callback);
}

/// Cancels a named task on the process-wide wheel.
pub fn cancel(name: &str) {
    wheel().cancel(name);
}
