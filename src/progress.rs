//! Progress reporting and cooperative cancellation for subcube runs.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Receives progress notifications from the executor.
pub trait ProgressSink {
    fn init_progress(&mut self, label: &str, total: usize);

    /// Called once per finished POV. Returning `true` asks the executor to
    /// stop after the current POV.
    fn iteration_complete(&mut self) -> bool;

    fn end_progress(&mut self);

    /// Brackets an engine call that may block for a long time.
    fn monitor_blocking_task(&mut self) {}

    fn blocking_task_complete(&mut self) {}
}

/// Shared cancellation flag, checked between POVs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Progress sink that reports through `tracing`.
///
/// Logs roughly every five percent, honours an optional iteration limit and,
/// when a stall threshold is set, warns from a single watchdog thread while a
/// blocking task is still running past it.
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    total: usize,
    completed: usize,
    report_every: usize,
    max_iterations: Option<usize>,
    stall_warn_after: Option<Duration>,
    started: Option<Instant>,
    blocking_since: Option<Instant>,
    watchdog: Option<StallWatchdog>,
}

impl LogProgress {
    /// A zero stall threshold disables the watchdog.
    pub fn new(max_iterations: Option<NonZeroUsize>, stall_warn_after: Option<Duration>) -> Self {
        Self {
            label: String::new(),
            total: 0,
            completed: 0,
            report_every: 1,
            max_iterations: max_iterations.map(NonZeroUsize::get),
            stall_warn_after: stall_warn_after.filter(|threshold| !threshold.is_zero()),
            started: None,
            blocking_since: None,
            watchdog: None,
        }
    }

    fn notify_watchdog(&mut self, event: WatchEvent) {
        let Some(threshold) = self.stall_warn_after else {
            return;
        };
        if self.watchdog.is_none() {
            match StallWatchdog::spawn(threshold) {
                Ok(watchdog) => self.watchdog = Some(watchdog),
                Err(err) => {
                    warn!(error = %err, "failed to start stall watchdog");
                    self.stall_warn_after = None;
                    return;
                }
            }
        }
        let delivered = self
            .watchdog
            .as_ref()
            .is_some_and(|watchdog| watchdog.events.send(event).is_ok());
        if !delivered {
            self.stop_watchdog();
        }
    }

    fn stop_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            drop(watchdog.events);
            if watchdog.handle.join().is_err() {
                warn!("stall watchdog panicked");
            }
        }
    }
}

#[derive(Debug)]
enum WatchEvent {
    Started { label: String, position: usize },
    Finished,
}

/// One background thread per run; it sleeps on its channel and wakes every
/// threshold interval while a blocking task is open.
#[derive(Debug)]
struct StallWatchdog {
    events: mpsc::Sender<WatchEvent>,
    handle: thread::JoinHandle<()>,
}

impl StallWatchdog {
    fn spawn(threshold: Duration) -> std::io::Result<Self> {
        let (events, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("stall-watchdog".to_string())
            .spawn(move || watch(&receiver, threshold))?;
        Ok(Self { events, handle })
    }
}

fn watch(receiver: &mpsc::Receiver<WatchEvent>, threshold: Duration) {
    let mut open: Option<(String, usize, Instant)> = None;
    loop {
        let event = match &open {
            None => match receiver.recv() {
                Ok(event) => event,
                Err(_) => return,
            },
            Some((label, position, since)) => match receiver.recv_timeout(threshold) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        operation = %label,
                        pov = position,
                        elapsed_secs = since.elapsed().as_secs(),
                        "blocking task still running"
                    );
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            },
        };
        open = match event {
            WatchEvent::Started { label, position } => Some((label, position, Instant::now())),
            WatchEvent::Finished => None,
        };
    }
}

impl ProgressSink for LogProgress {
    fn init_progress(&mut self, label: &str, total: usize) {
        self.label = label.to_string();
        self.total = total;
        self.completed = 0;
        self.report_every = (total / 20).max(1);
        self.started = Some(Instant::now());
        info!(operation = %self.label, total, "starting subcube operation");
    }

    fn iteration_complete(&mut self) -> bool {
        self.completed += 1;
        if self.completed % self.report_every == 0 || self.completed == self.total {
            let percent = if self.total == 0 {
                100
            } else {
                self.completed * 100 / self.total
            };
            info!(
                operation = %self.label,
                completed = self.completed,
                total = self.total,
                percent,
                "progress"
            );
        }

        match self.max_iterations {
            Some(limit) if self.completed >= limit => {
                info!(limit, "iteration limit reached");
                true
            }
            _ => false,
        }
    }

    fn end_progress(&mut self) {
        self.stop_watchdog();
        self.blocking_since = None;

        let elapsed_ms = self
            .started
            .take()
            .map(|started| started.elapsed().as_millis())
            .unwrap_or(0);
        info!(
            operation = %self.label,
            completed = self.completed,
            total = self.total,
            elapsed_ms,
            "subcube operation finished"
        );
    }

    fn monitor_blocking_task(&mut self) {
        self.blocking_since = Some(Instant::now());
        let event = WatchEvent::Started {
            label: self.label.clone(),
            position: self.completed + 1,
        };
        self.notify_watchdog(event);
    }

    fn blocking_task_complete(&mut self) {
        self.notify_watchdog(WatchEvent::Finished);
        if let (Some(since), Some(threshold)) = (self.blocking_since.take(), self.stall_warn_after)
        {
            let elapsed = since.elapsed();
            if elapsed >= threshold {
                warn!(
                    operation = %self.label,
                    elapsed_secs = elapsed.as_secs(),
                    "blocking task completed after stall threshold"
                );
            }
        }
    }
}

impl Drop for LogProgress {
    fn drop(&mut self) {
        self.stop_watchdog();
    }
}
