//! Idle and animation-frame callbacks backed by tokio timers.
//!
//! Timers run on the runtime; callbacks never do. Fired ids are queued and
//! the owning thread drains them with [`Scheduler::run_due`], so callbacks
//! observe the same single-threaded world as the interpreter.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::Waker;

use futures_util::task::AtomicWaker;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use crate::config::{HostCapabilities, InterpreterConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Idle,
    Frame,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackKind::Idle => f.write_str("idle"),
            CallbackKind::Frame => f.write_str("animation frame"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("host cannot schedule {0} callbacks; using an immediate timer")]
    Unavailable(CallbackKind),
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,
}

/// Cancellation handle returned to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    id: u32,
    kind: CallbackKind,
    degraded: bool,
}

impl CallbackHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// Set when the host lacked the primitive and a plain timer was used.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleDeadline {
    pub time_remaining: Duration,
    pub did_timeout: bool,
}

/// Argument passed to a fired callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Idle(IdleDeadline),
    /// Milliseconds since the scheduler started.
    Frame(f64),
}

pub type Callback = Box<dyn FnOnce(Tick)>;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub frame_interval: Duration,
    pub idle_delay: Duration,
    pub idle_budget: Duration,
    pub capabilities: HostCapabilities,
}

impl From<&InterpreterConfig> for SchedulerConfig {
    fn from(config: &InterpreterConfig) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            idle_delay: config.idle_delay(),
            idle_budget: config.idle_budget(),
            capabilities: config.capabilities,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&InterpreterConfig::default())
    }
}

struct Entry {
    kind: CallbackKind,
    callback: Callback,
    task: JoinHandle<()>,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct Fired {
    id: u32,
    timed_out: bool,
}

pub struct Scheduler {
    handle: Handle,
    config: SchedulerConfig,
    start: Instant,
    next_id: Cell<u32>,
    entries: RefCell<HashMap<u32, Entry>>,
    fired_rx: RefCell<UnboundedReceiver<Fired>>,
    fired_tx: UnboundedSender<Fired>,
    ready: RefCell<Vec<Fired>>,
    waker: Arc<AtomicWaker>,
}

impl Scheduler {
    pub fn new(handle: Handle, config: SchedulerConfig) -> Self {
        let (fired_tx, fired_rx) = unbounded_channel();
        Self {
            handle,
            config,
            start: Instant::now(),
            next_id: Cell::new(1),
            entries: RefCell::new(HashMap::new()),
            fired_rx: RefCell::new(fired_rx),
            fired_tx,
            ready: RefCell::new(Vec::new()),
            waker: Arc::new(AtomicWaker::new()),
        }
    }

    /// Uses the runtime the caller is running on.
    pub fn try_current(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::new(handle, config))
    }

    /// Runs `callback` once the host is idle, or after `timeout` at the latest.
    pub fn request_idle_callback(
        &self,
        timeout: Option<Duration>,
        callback: impl FnOnce(Tick) + 'static,
    ) -> CallbackHandle {
        if !self.config.capabilities.idle_callback {
            return self.degraded(CallbackKind::Idle, Box::new(callback));
        }
        let (delay, timed_out) = match timeout {
            Some(timeout) if timeout < self.config.idle_delay => (timeout, true),
            _ => (self.config.idle_delay, false),
        };
        let deadline = Instant::now() + delay + self.config.idle_budget;
        self.schedule(
            CallbackKind::Idle,
            delay,
            timed_out,
            Some(deadline),
            Box::new(callback),
            false,
        )
    }

    /// Runs `callback` at the next frame boundary.
    pub fn request_animation_frame(&self, callback: impl FnOnce(Tick) + 'static) -> CallbackHandle {
        if !self.config.capabilities.animation_frame {
            return self.degraded(CallbackKind::Frame, Box::new(callback));
        }
        let interval = self.config.frame_interval;
        let elapsed = self.start.elapsed().as_nanos() % interval.as_nanos().max(1);
        let delay = interval - Duration::from_nanos(elapsed as u64);
        self.schedule(CallbackKind::Frame, delay, false, None, Box::new(callback), false)
    }

    /// Returns `false` if the callback already ran or was cancelled.
    pub fn cancel(&self, handle: CallbackHandle) -> bool {
        let Some(entry) = self.entries.borrow_mut().remove(&handle.id) else {
            return false;
        };
        entry.task.abort();
        tracing::trace!(target: "scheduler", id = handle.id, kind = %handle.kind, "cancelled");
        self.waker.wake();
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.entries.borrow().is_empty()
    }

    pub fn pending(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Invokes every callback whose timer has fired. Returns how many ran.
    pub fn run_due(&self) -> usize {
        let mut fired = std::mem::take(&mut *self.ready.borrow_mut());
        {
            let mut rx = self.fired_rx.borrow_mut();
            while let Ok(next) = rx.try_recv() {
                fired.push(next);
            }
        }

        let mut ran = 0;
        for Fired { id, timed_out } in fired {
            // Removed before invoking so callbacks may schedule or cancel freely.
            let Some(entry) = self.entries.borrow_mut().remove(&id) else {
                continue;
            };
            let tick = match entry.kind {
                CallbackKind::Idle => {
                    let time_remaining = if timed_out {
                        Duration::ZERO
                    } else {
                        entry
                            .deadline
                            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                            .unwrap_or(self.config.idle_budget)
                    };
                    Tick::Idle(IdleDeadline {
                        time_remaining,
                        did_timeout: timed_out,
                    })
                }
                CallbackKind::Frame => Tick::Frame(self.start.elapsed().as_secs_f64() * 1_000.0),
            };
            tracing::trace!(target: "scheduler", id, kind = %entry.kind, "running callback");
            (entry.callback)(tick);
            ran += 1;
        }
        ran
    }

    /// Waits until at least one callback fires, then runs everything due.
    /// Returns immediately with 0 when nothing is pending.
    pub async fn tick(&self) -> usize {
        if !self.has_pending() && self.ready.borrow().is_empty() {
            return 0;
        }
        let next = poll_fn(|cx| self.fired_rx.borrow_mut().poll_recv(cx)).await;
        if let Some(next) = next {
            self.ready.borrow_mut().push(next);
        }
        self.run_due()
    }

    fn degraded(&self, kind: CallbackKind, callback: Callback) -> CallbackHandle {
        tracing::warn!(target: "scheduler", "{}", SchedulerError::Unavailable(kind));
        let deadline = matches!(kind, CallbackKind::Idle)
            .then(|| Instant::now() + self.config.idle_budget);
        self.schedule(kind, Duration::ZERO, false, deadline, callback, true)
    }

    fn schedule(
        &self,
        kind: CallbackKind,
        delay: Duration,
        timed_out: bool,
        deadline: Option<Instant>,
        callback: Callback,
        degraded: bool,
    ) -> CallbackHandle {
        let id = self.next_id();
        let tx = self.fired_tx.clone();
        let waker = Arc::clone(&self.waker);
        let task = self.handle.spawn(async move {
            sleep(delay).await;
            if tx.send(Fired { id, timed_out }).is_ok() {
                waker.wake();
            }
        });
        self.entries.borrow_mut().insert(
            id,
            Entry {
                kind,
                callback,
                task,
                deadline,
            },
        );
        tracing::trace!(target: "scheduler", id, %kind, ?delay, degraded, "scheduled");
        CallbackHandle { id, kind, degraded }
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1).max(1));
        id
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, entry) in self.entries.get_mut().drain() {
            entry.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[tokio::test(start_paused = true)]
    async fn frame_callbacks_receive_a_timestamp() {
        let scheduler = Scheduler::try_current(SchedulerConfig::default()).unwrap();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let handle = scheduler.request_animation_frame(move |tick| {
            *sink.borrow_mut() = Some(tick);
        });
        assert!(!handle.is_degraded());
        assert_eq!(scheduler.tick().await, 1);
        match *seen.borrow() {
            Some(Tick::Frame(ms)) => assert!(ms >= 16.0),
            other => panic!("unexpected tick {other:?}"),
        }
        assert!(!scheduler.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn short_timeout_marks_idle_deadline() {
        let config = SchedulerConfig {
            idle_delay: Duration::from_millis(100),
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::try_current(config).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        scheduler.request_idle_callback(Some(Duration::from_millis(5)), move |tick| {
            sink.borrow_mut().push(tick)
        });
        assert_eq!(scheduler.tick().await, 1);
        assert_eq!(
            seen.borrow()[0],
            Tick::Idle(IdleDeadline {
                time_remaining: Duration::ZERO,
                did_timeout: true
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_callbacks_never_run() {
        let scheduler = Scheduler::try_current(SchedulerConfig::default()).unwrap();
        let count = Rc::new(Cell::new(0));
        let first = Rc::clone(&count);
        let second = Rc::clone(&count);
        let cancelled = scheduler.request_idle_callback(None, move |_| first.set(first.get() + 1));
        scheduler.request_animation_frame(move |_| second.set(second.get() + 10));
        assert!(scheduler.cancel(cancelled));
        assert!(!scheduler.cancel(cancelled));

        assert_eq!(scheduler.tick().await, 1);
        assert_eq!(count.get(), 10);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.run_due(), 0);
        assert_eq!(scheduler.tick().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_capability_degrades_to_a_timer() {
        let config = SchedulerConfig {
            capabilities: HostCapabilities {
                idle_callback: false,
                animation_frame: false,
            },
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::try_current(config).unwrap();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let handle = scheduler.request_animation_frame(move |_| flag.set(true));
        assert!(handle.is_degraded());
        assert_eq!(handle.kind(), CallbackKind::Frame);
        assert_eq!(scheduler.tick().await, 1);
        assert!(ran.get());
    }

    #[test]
    fn requires_a_runtime() {
        assert_eq!(
            Scheduler::try_current(SchedulerConfig::default()).err(),
            Some(SchedulerError::NoRuntime)
        );
    }
}
