//! Cooperative task scheduling for the single-threaded host loop.
//!
//! Nothing here runs on its own: the host advances the [`Scheduler`] clock and
//! dispatches the tasks that became due. Every registration is owned by a
//! [`TaskHandle`]; dropping the handle cancels the task.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    rc::{Rc, Weak},
    time::Duration,
};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Fires on the next advance of the clock, like an animation frame.
    AnimationFrame,
    /// Fires once the clock reaches its deadline.
    Timeout,
}

/// A task that became due during [`Scheduler::advance_to`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiredTask {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Host clock at dispatch, in milliseconds.
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct PendingTask {
    kind: TaskKind,
    due_ms: f64,
}

#[derive(Debug, Default)]
struct TaskQueue {
    now_ms: f64,
    next_id: TaskId,
    pending: BTreeMap<TaskId, PendingTask>,
}

impl TaskQueue {
    fn insert(&mut self, kind: TaskKind, due_ms: f64) -> TaskId {
        self.next_id += 1;
        self.pending.insert(self.next_id, PendingTask { kind, due_ms });
        self.next_id
    }
}

/// Shared handle to the host task queue. Clones refer to the same queue.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: Rc<RefCell<TaskQueue>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> f64 {
        self.queue.borrow().now_ms
    }

    /// Requests a callback on the next call to [`Scheduler::advance_to`],
    /// even one that leaves the clock where it is. A frame requested while
    /// dispatching fires on the call after that.
    pub fn request_frame(&self) -> TaskHandle {
        let mut queue = self.queue.borrow_mut();
        let due = queue.now_ms;
        let id = queue.insert(TaskKind::AnimationFrame, due);
        self.handle(id)
    }

    /// Requests a callback once `delay` has elapsed on the host clock.
    pub fn set_timeout(&self, delay: Duration) -> TaskHandle {
        let mut queue = self.queue.borrow_mut();
        let due = queue.now_ms + delay.as_secs_f64() * 1000.0;
        let id = queue.insert(TaskKind::Timeout, due);
        self.handle(id)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().pending.len()
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.queue.borrow().pending.contains_key(&id)
    }

    /// Moves the clock forward and removes every task that is now due.
    ///
    /// Tasks are returned in deadline order. Tasks registered while the
    /// caller dispatches the result fire on a later advance. The clock never
    /// moves backwards.
    pub fn advance_to(&self, now_ms: f64) -> Vec<FiredTask> {
        let mut queue = self.queue.borrow_mut();
        if now_ms > queue.now_ms {
            queue.now_ms = now_ms;
        }
        let now = queue.now_ms;

        let mut due: Vec<(TaskId, PendingTask)> = queue
            .pending
            .iter()
            .filter(|(_, task)| task.due_ms <= now)
            .map(|(id, task)| (*id, *task))
            .collect();
        for (id, _) in &due {
            queue.pending.remove(id);
        }
        due.sort_by(|a, b| a.1.due_ms.total_cmp(&b.1.due_ms).then(a.0.cmp(&b.0)));

        due.into_iter()
            .map(|(id, task)| FiredTask {
                id,
                kind: task.kind,
                timestamp_ms: now,
            })
            .collect()
    }

    fn handle(&self, id: TaskId) -> TaskHandle {
        TaskHandle {
            id,
            queue: Rc::downgrade(&self.queue),
        }
    }
}

/// Ownership of a scheduled task. Dropping it cancels the task if it has not
/// fired yet.
#[derive(Debug)]
#[must_use = "dropping a task handle cancels the task"]
pub struct TaskHandle {
    id: TaskId,
    queue: Weak<RefCell<TaskQueue>>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns `true` if `fired` is the task this handle owns.
    pub fn matches(&self, fired: &FiredTask) -> bool {
        self.id == fired.id
    }

    pub fn cancel(self) {}
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.borrow_mut().pending.remove(&self.id);
        }
    }
}
