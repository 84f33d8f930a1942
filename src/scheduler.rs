//! Named periodic tasks driven from a single thread.
//!
//! Tasks run in the order they were registered, so two tasks due on the
//! same tick never overlap and always run in the same order.

use log::{debug, info, warn};
use std::{
    io,
    sync::mpsc::{self, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// The longest we sleep before checking for a stop request again.
const MAX_NAP: Duration = Duration::from_millis(5);

/// What a task wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    /// Run again next period.
    Continue,
    /// Stop the whole scheduler after this tick.
    Halt,
}

type Task = Box<dyn FnMut() -> TaskControl + Send>;

struct PeriodicTask {
    name: String,
    period: Duration,
    next_due: Instant,
    action: Task,
}

/// A set of periodic tasks.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    /// A scheduler with no tasks.
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Registers `action` to run every `period`, first one period from now.
    pub fn every<F>(mut self, name: impl Into<String>, period: Duration, action: F) -> Self
    where
        F: FnMut() -> TaskControl + Send + 'static,
    {
        self.tasks.push(PeriodicTask {
            name: name.into(),
            period,
            next_due: Instant::now() + period,
            action: Box::new(action),
        });
        self
    }

    /// Task names in the order they run.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    /// The earliest deadline of any task.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.next_due).min()
    }

    /// Runs every task that is due at `now`, in registration order.
    ///
    /// A task that fell behind runs once and is rescheduled one period from
    /// `now`; missed ticks are dropped rather than replayed.
    pub fn run_pending(&mut self, now: Instant) -> TaskControl {
        let mut control = TaskControl::Continue;
        for task in self.tasks.iter_mut().filter(|t| t.next_due <= now) {
            if (task.action)() == TaskControl::Halt {
                debug!("task '{}' halted the scheduler", task.name);
                control = TaskControl::Halt;
            }
            task.next_due += task.period;
            if task.next_due <= now {
                task.next_due = now + task.period;
            }
        }
        control
    }

    /// Moves the tasks onto their own thread.
    pub fn spawn(mut self, name: impl Into<String>) -> io::Result<SchedulerHandle> {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Signal>();
        let th_name = name.clone();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            info!("{th_name} : running.");
            loop {
                match rx.try_recv() {
                    Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                let now = Instant::now();
                match self.next_due() {
                    Some(due) if due > now => {
                        spin_sleep::sleep((due - now).min(MAX_NAP));
                        continue;
                    }
                    Some(_) => {}
                    None => {
                        spin_sleep::sleep(MAX_NAP);
                        continue;
                    }
                }

                if self.run_pending(now) == TaskControl::Halt {
                    break;
                }
            }
            info!("{th_name} : terminated.");
        })?;

        Ok(SchedulerHandle {
            name,
            handle: Some(handle),
            tx,
        })
    }
}

enum Signal {
    Stop,
}

/// Handle to a scheduler running on its own thread.
pub struct SchedulerHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
}

impl SchedulerHandle {
    /// Whether the scheduler thread is still running. Turns false by itself
    /// once a task halts it.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Asks the scheduler to stop and waits at most `timeout` for it.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let _ = self.tx.send(Signal::Stop);
        match self.handle.take() {
            Some(handle) => join_within(handle, timeout, &self.name),
            None => true,
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
    }
}

/// Joins `handle` if the thread finishes within `timeout`.
///
/// Otherwise the thread is detached and left to exit on its own, which is
/// logged. Returns whether the thread was joined.
pub fn join_within(handle: JoinHandle<()>, timeout: Duration, what: &str) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{what} : did not stop within {timeout:?}, abandoning thread");
            return false;
        }
        thread::sleep(Duration::from_micros(200));
    }
    if handle.join().is_err() {
        warn!("{what} : thread panicked");
    }
    true
}
