// SpiProbe - SPI Timing Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Single-threaded discrete-event kernel.
//!
//! Every process is an `async` task multiplexed onto the calling thread.
//! Tasks only yield at [`Wait`] points. Simulated time advances to the
//! earliest pending timer once no task is runnable at the current instant.
//!
//! Within one instant the kernel runs *delta steps*: each step polls the
//! tasks made ready by the previous step, in task creation order. Writes
//! are visible immediately, but the edge wakeups they cause are delivered
//! in the following step. If several triggers of one wait fire within the
//! same step, the one registered first wins.

use crate::signals::{DigitalLevel, Edge, SignalDriver, SignalId};
use crate::time::SimTime;
use crate::triggers::{Trigger, Wait};
use crate::{SignalInfo, SimResult, SimulationError, SimulationObserver};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

pub const DEFAULT_MAX_DELTAS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Runnable,
    Waiting,
    Finished,
    Cancelled,
}

struct Task {
    name: String,
    future: Option<TaskFuture>,
    state: TaskState,
    /// Bumped on every registration so triggers of an abandoned wait are
    /// recognised as stale.
    epoch: u64,
    fired: Option<(u64, usize)>,
}

struct Waiter {
    task: TaskId,
    epoch: u64,
    edge: Edge,
    index: usize,
}

struct SignalSlot {
    name: String,
    level: DigitalLevel,
    waiters: Vec<Waiter>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    at: SimTime,
    seq: u64,
    task: TaskId,
    epoch: u64,
    index: usize,
}

struct Kernel {
    now: SimTime,
    tasks: Vec<Task>,
    signals: Vec<SignalSlot>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    /// Tasks to poll in the next delta step, with the winning trigger index
    /// (`None` for a task that has not been polled yet).
    ready: BTreeMap<TaskId, Option<usize>>,
    current: Option<TaskId>,
    seq: u64,
    time_limit: Option<SimTime>,
    max_deltas: u32,
    observers: Vec<Arc<dyn SimulationObserver>>,
}

impl Kernel {
    fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            tasks: Vec::new(),
            signals: Vec::new(),
            timers: BinaryHeap::new(),
            ready: BTreeMap::new(),
            current: None,
            seq: 0,
            time_limit: None,
            max_deltas: DEFAULT_MAX_DELTAS,
            observers: Vec::new(),
        }
    }

    fn write(&mut self, id: SignalId, level: DigitalLevel) {
        let now = self.now;
        let Kernel {
            signals,
            tasks,
            ready,
            observers,
            ..
        } = self;
        let slot = &mut signals[id.0];
        let Some(edge) = Edge::between(slot.level, level) else {
            return;
        };
        slot.level = level;

        for observer in observers.iter() {
            observer.on_signal_change(now, id, level);
        }

        slot.waiters.retain(|w| {
            let task = &tasks[w.task.0];
            if task.state != TaskState::Waiting || task.epoch != w.epoch {
                return false;
            }
            if w.edge != edge {
                return true;
            }
            mark_ready(ready, w.task, w.index);
            false
        });
    }

    fn register_wait(&mut self, triggers: &[Trigger]) -> u64 {
        let Some(task_id) = self.current else {
            panic!("simulation wait polled outside of a kernel task");
        };
        let task = &mut self.tasks[task_id.0];
        task.epoch += 1;
        task.state = TaskState::Waiting;
        task.fired = None;
        let epoch = task.epoch;

        for (index, trigger) in triggers.iter().enumerate() {
            match *trigger {
                Trigger::Edge { signal, edge } => {
                    self.signals[signal.0].waiters.push(Waiter {
                        task: task_id,
                        epoch,
                        edge,
                        index,
                    });
                }
                Trigger::Timer(delay) => {
                    self.seq += 1;
                    self.timers.push(Reverse(TimerEntry {
                        at: self.now + delay,
                        seq: self.seq,
                        task: task_id,
                        epoch,
                        index,
                    }));
                }
            }
        }
        epoch
    }

    fn take_fired(&mut self, epoch: u64) -> Option<usize> {
        let task_id = self.current?;
        let task = &mut self.tasks[task_id.0];
        match task.fired {
            Some((fired_epoch, index)) if fired_epoch == epoch => {
                task.fired = None;
                Some(index)
            }
            _ => None,
        }
    }

    /// Drains the ready set for one delta step.
    fn take_ready(&mut self) -> Vec<TaskId> {
        let ready = std::mem::take(&mut self.ready);
        let mut batch = Vec::with_capacity(ready.len());
        for (id, fired) in ready {
            let task = &mut self.tasks[id.0];
            match task.state {
                TaskState::Finished | TaskState::Cancelled => continue,
                TaskState::Waiting => {
                    if let Some(index) = fired {
                        task.fired = Some((task.epoch, index));
                    }
                    task.state = TaskState::Runnable;
                }
                TaskState::Runnable => {}
            }
            batch.push(id);
        }
        batch
    }

    /// Moves time forward to the next instant at which some task wakes.
    fn advance(&mut self) -> SimResult<()> {
        loop {
            let Some(Reverse(next)) = self.timers.peek() else {
                return Err(SimulationError::Stalled(self.now));
            };
            let at = next.at;
            if let Some(limit) = self.time_limit {
                if at > limit {
                    return Err(SimulationError::TimeLimitExceeded { limit });
                }
            }
            self.now = at;

            while let Some(Reverse(entry)) = self.timers.peek() {
                if entry.at != at {
                    break;
                }
                let Some(Reverse(entry)) = self.timers.pop() else {
                    break;
                };
                let task = &self.tasks[entry.task.0];
                if task.state == TaskState::Waiting && task.epoch == entry.epoch {
                    mark_ready(&mut self.ready, entry.task, entry.index);
                }
            }

            if !self.ready.is_empty() {
                return Ok(());
            }
        }
    }
}

fn mark_ready(ready: &mut BTreeMap<TaskId, Option<usize>>, task: TaskId, index: usize) {
    ready
        .entry(task)
        .and_modify(|fired| {
            *fired = Some(fired.map_or(index, |f| f.min(index)));
        })
        .or_insert(Some(index));
}

struct NoopWaker;

impl Wake for NoopWaker {
    fn wake(self: Arc<Self>) {}
}

/// Shared handle to one simulation session.
///
/// Cloning is cheap; every signal handle and task holds one.
#[derive(Clone)]
pub struct Sim(Rc<RefCell<Kernel>>);

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Sim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(kernel) => f
                .debug_struct("Sim")
                .field("now", &kernel.now)
                .field("tasks", &kernel.tasks.len())
                .field("signals", &kernel.signals.len())
                .finish(),
            Err(_) => f.write_str("Sim { <running> }"),
        }
    }
}

impl Sim {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Kernel::new())))
    }

    /// Abandon a run once simulated time would pass `limit`.
    pub fn set_time_limit(&self, limit: Option<SimTime>) {
        self.0.borrow_mut().time_limit = limit;
    }

    pub fn set_max_deltas(&self, max_deltas: u32) {
        self.0.borrow_mut().max_deltas = max_deltas;
    }

    /// Observers are called while the kernel is busy and must not use the
    /// `Sim` themselves.
    pub fn add_observer(&self, observer: Arc<dyn SimulationObserver>) {
        self.0.borrow_mut().observers.push(observer);
    }

    pub fn now(&self) -> SimTime {
        self.0.borrow().now
    }

    /// Creates a line and returns its only write handle.
    pub fn signal(&self, name: &str, initial: DigitalLevel) -> SignalDriver {
        let mut kernel = self.0.borrow_mut();
        let id = SignalId(kernel.signals.len());
        kernel.signals.push(SignalSlot {
            name: name.to_string(),
            level: initial,
            waiters: Vec::new(),
        });
        drop(kernel);
        SignalDriver::new(id, self.clone())
    }

    pub fn signals(&self) -> Vec<SignalInfo> {
        signal_infos(&self.0.borrow())
    }

    pub fn signal_name(&self, id: SignalId) -> String {
        self.0.borrow().signals[id.0].name.clone()
    }

    pub(crate) fn read(&self, id: SignalId) -> DigitalLevel {
        self.0.borrow().signals[id.0].level
    }

    pub(crate) fn write(&self, id: SignalId, level: DigitalLevel) {
        self.0.borrow_mut().write(id, level);
    }

    /// Starts `future` as a concurrent task. It first runs in the next
    /// delta step of the current instant.
    pub fn spawn<F>(&self, name: &str, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let mut kernel = self.0.borrow_mut();
        let id = TaskId(kernel.tasks.len());
        kernel.tasks.push(Task {
            name: name.to_string(),
            future: Some(Box::pin(future)),
            state: TaskState::Runnable,
            epoch: 0,
            fired: None,
        });
        kernel.ready.insert(id, None);
        tracing::trace!("spawned task {} ({:?}) at {}", name, id, kernel.now);
        TaskHandle {
            id,
            sim: self.clone(),
        }
    }

    /// Suspends the calling task for `delay`.
    pub fn timer(&self, delay: SimTime) -> Wait {
        Wait::new(self.clone(), vec![Trigger::Timer(delay)])
    }

    /// Suspends the calling task until the earliest of `triggers` fires and
    /// yields its index.
    pub fn first_of(&self, triggers: impl IntoIterator<Item = Trigger>) -> Wait {
        Wait::new(self.clone(), triggers.into_iter().collect())
    }

    pub(crate) fn register_wait(&self, triggers: &[Trigger]) -> u64 {
        self.0.borrow_mut().register_wait(triggers)
    }

    pub(crate) fn take_fired(&self, epoch: u64) -> Option<usize> {
        self.0.borrow_mut().take_fired(epoch)
    }

    /// Runs the event loop until `future` completes and returns its output.
    ///
    /// Background tasks spawned before or during the run keep their state
    /// afterwards, so `run` may be called again on the same session.
    pub fn run<T, F>(&self, future: F) -> SimResult<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&output);
        let root = self.spawn("root", async move {
            let value = future.await;
            *slot.borrow_mut() = Some(value);
        });

        let (observers, signals) = {
            let kernel = self.0.borrow();
            (kernel.observers.clone(), signal_infos(&kernel))
        };
        for observer in &observers {
            observer.on_simulation_start(&signals);
        }

        let result = self.drive(&root, &output);

        let now = self.now();
        for observer in &observers {
            observer.on_simulation_stop(now);
        }
        if let Err(e) = &result {
            tracing::debug!("run aborted at {}: {}", now, e);
            root.cancel();
        }
        result
    }

    fn drive<T>(&self, root: &TaskHandle, output: &Rc<RefCell<Option<T>>>) -> SimResult<T> {
        let max_deltas = self.0.borrow().max_deltas;
        let mut instant = self.now();
        let mut deltas = 0u32;
        loop {
            loop {
                let batch = self.0.borrow_mut().take_ready();
                if batch.is_empty() {
                    break;
                }
                deltas += 1;
                if deltas > max_deltas {
                    return Err(SimulationError::DeltaOverflow {
                        time: instant,
                        limit: max_deltas,
                    });
                }
                for id in batch {
                    self.poll_task(id);
                    if let Some(value) = output.borrow_mut().take() {
                        return Ok(value);
                    }
                }
            }
            if root.is_finished() {
                return Err(SimulationError::Stalled(self.now()));
            }
            self.0.borrow_mut().advance()?;
            // Zero-delay timers re-enter the same instant and keep counting.
            let now = self.now();
            if now != instant {
                instant = now;
                deltas = 0;
            }
        }
    }

    fn poll_task(&self, id: TaskId) {
        let future = {
            let mut kernel = self.0.borrow_mut();
            let task = &mut kernel.tasks[id.0];
            if task.state != TaskState::Runnable {
                return;
            }
            let future = task.future.take();
            kernel.current = Some(id);
            future
        };
        let Some(mut future) = future else {
            return;
        };

        let waker = Waker::from(Arc::new(NoopWaker));
        let mut cx = Context::from_waker(&waker);
        let poll = future.as_mut().poll(&mut cx);

        // Dropped after the kernel borrow is released.
        let retired = {
            let mut kernel = self.0.borrow_mut();
            kernel.current = None;
            let now = kernel.now;
            let task = &mut kernel.tasks[id.0];
            match poll {
                Poll::Ready(()) => {
                    if task.state != TaskState::Cancelled {
                        task.state = TaskState::Finished;
                    }
                    tracing::trace!("task {} finished at {}", task.name, now);
                    Some(future)
                }
                Poll::Pending if task.state == TaskState::Cancelled => Some(future),
                Poll::Pending => {
                    task.future = Some(future);
                    None
                }
            }
        };
        drop(retired);
    }

    fn cancel(&self, id: TaskId) {
        let future = {
            let mut kernel = self.0.borrow_mut();
            kernel.ready.remove(&id);
            let now = kernel.now;
            let task = &mut kernel.tasks[id.0];
            match task.state {
                TaskState::Finished | TaskState::Cancelled => None,
                TaskState::Runnable | TaskState::Waiting => {
                    task.state = TaskState::Cancelled;
                    tracing::trace!("task {} cancelled at {}", task.name, now);
                    task.future.take()
                }
            }
        };
        drop(future);
    }

    fn task_state(&self, id: TaskId) -> TaskState {
        self.0.borrow().tasks[id.0].state
    }

    /// Cancels every task and drops pending waits, ending the session.
    ///
    /// Tasks hold `Sim` clones, so a session that is simply dropped while
    /// tasks are alive is never freed.
    pub fn shutdown(&self) {
        let (futures, timers) = {
            let mut kernel = self.0.borrow_mut();
            kernel.ready.clear();
            for signal in kernel.signals.iter_mut() {
                signal.waiters.clear();
            }
            let futures: Vec<_> = kernel
                .tasks
                .iter_mut()
                .filter_map(|task| {
                    if matches!(task.state, TaskState::Runnable | TaskState::Waiting) {
                        task.state = TaskState::Cancelled;
                    }
                    task.future.take()
                })
                .collect();
            let timers = std::mem::take(&mut kernel.timers);
            kernel.observers.clear();
            (futures, timers)
        };
        drop(futures);
        drop(timers);
    }
}

fn signal_infos(kernel: &Kernel) -> Vec<SignalInfo> {
    kernel
        .signals
        .iter()
        .enumerate()
        .map(|(i, s)| SignalInfo {
            id: SignalId(i),
            name: s.name.clone(),
            level: s.level,
        })
        .collect()
}

/// Handle to a spawned task.
///
/// Dropping the handle leaves the task running; call [`TaskHandle::cancel`].
#[must_use = "dropping a TaskHandle does not stop the task"]
pub struct TaskHandle {
    id: TaskId,
    sim: Sim,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Stops the task. Once this returns the task performs no further
    /// writes. Cancelling a finished task is a no-op.
    pub fn cancel(&self) {
        self.sim.cancel(self.id);
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.sim.task_state(self.id),
            TaskState::Finished | TaskState::Cancelled
        )
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}
