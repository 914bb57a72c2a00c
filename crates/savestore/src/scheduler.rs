//! Debounced flush scheduling
//!
//! The scheduler decides when a save request turns into a flush:
//!
//! - Idle: flush right away, then arm the debounce timer
//! - Armed: cancel the timer and arm a fresh one, so a burst of requests
//!   collapses into one flush after the burst ends
//! - Timer expiry: flush and return to Idle
//!
//! Backends that cannot defer writes skip all of this and flush on every
//! request. A periodic tick flushes independently of the debounce timer.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

/// Default debounce delay
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(3100);

/// Default periodic flush interval
pub const DEFAULT_PERIODIC_INTERVAL: Duration = Duration::from_secs(60);

/// Something the scheduler can flush
#[async_trait]
pub trait FlushTarget: Send + Sync + 'static {
    /// Perform one flush
    async fn flush(&self);

    /// Whether flushes may be deferred
    fn can_defer(&self) -> bool;
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet period before a debounced flush
    pub debounce: Duration,
    /// Interval of the background safety-net flush
    pub periodic_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { debounce: DEFAULT_DEBOUNCE, periodic_interval: DEFAULT_PERIODIC_INTERVAL }
    }
}

impl SchedulerConfig {
    /// Set the debounce delay
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    /// Set the periodic flush interval
    pub fn periodic_interval(mut self, interval: Duration) -> Self {
        self.periodic_interval = interval;
        self
    }
}

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer outstanding
    Idle,
    /// A debounced flush is due at `deadline`
    Armed {
        /// When the flush fires
        deadline: Instant,
    },
}

struct Timer {
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Debounced flush scheduler
pub struct SyncScheduler {
    config: SchedulerConfig,
    timer: Arc<Mutex<Option<Timer>>>,
    next_generation: AtomicU64,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Create an idle scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            timer: Arc::new(Mutex::new(None)),
            next_generation: AtomicU64::new(0),
            periodic: Mutex::new(None),
        }
    }

    /// Scheduler configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        match self.timer.lock().as_ref() {
            Some(timer) => SchedulerState::Armed { deadline: timer.deadline },
            None => SchedulerState::Idle,
        }
    }

    /// Handle a save request
    pub async fn request<T: FlushTarget>(&self, target: &Arc<T>) {
        if !target.can_defer() {
            tracing::debug!("backend cannot defer, flushing now");
            target.flush().await;
            return;
        }

        if self.arm(target) {
            target.flush().await;
        }
    }

    /// Arm a fresh timer, cancelling any outstanding one
    ///
    /// Returns `true` if the scheduler was idle.
    fn arm<T: FlushTarget>(&self, target: &Arc<T>) -> bool {
        let mut slot = self.timer.lock();

        let was_idle = match slot.take() {
            Some(previous) => {
                previous.handle.abort();
                tracing::debug!("save already pending, re-arming debounce timer");
                false
            }
            None => true,
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.config.debounce;
        let timer_slot = Arc::clone(&self.timer);
        let target = Arc::clone(target);

        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;

            {
                let mut slot = timer_slot.lock();
                match slot.as_ref() {
                    Some(timer) if timer.generation == generation => *slot = None,
                    _ => return,
                }
            }

            target.flush().await;
        });

        *slot = Some(Timer { generation, deadline, handle });
        was_idle
    }

    /// Cancel the outstanding timer without flushing
    pub fn cancel(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.handle.abort();
        }
    }

    /// Start the periodic safety-net flush
    ///
    /// The task holds a weak reference and stops once the target is dropped.
    /// Starting again replaces the previous task.
    pub fn start_periodic<T: FlushTarget>(&self, target: &Arc<T>) {
        let weak: Weak<T> = Arc::downgrade(target);
        let period = self.config.periodic_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(target) = weak.upgrade() else {
                    break;
                };
                tracing::debug!("periodic flush");
                target.flush().await;
            }
        });

        if let Some(previous) = self.periodic.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the periodic flush
    pub fn stop_periodic(&self) {
        if let Some(handle) = self.periodic.lock().take() {
            handle.abort();
        }
    }

    /// Whether the periodic flush is running
    pub fn is_periodic_running(&self) -> bool {
        self.periodic.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop_periodic();
    }
}
