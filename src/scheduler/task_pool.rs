//! Generic task/agent pool.
//!
//! A bounded set of agents works through a priority-ordered waiting list.
//! Each agent runs at most one task. The pool never blocks: a task that
//! cannot start yet is retried on a later tick and keeps its position.

use serde::Serialize;
use tracing::trace;

use super::priority::{PrioritizedItem, Priority};

/// Result of an agent trying to start a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTaskStatus {
    /// Finished synchronously.
    Done,
    /// Started; completes asynchronously.
    CanResume,
    /// Preconditions not met yet.
    HasToWait,
    /// Failed; the task has already reported its failure.
    UnknownError,
}

/// A unit of work scheduled by a [`TaskPool`].
pub trait Task {
    fn serial(&self) -> u64;

    fn priority(&self) -> Priority;

    /// True once the task has reported success or failure.
    fn is_done(&self) -> bool;

    fn description(&self) -> String;
}

/// An agent owned by a pool.
pub trait TaskAgent {
    type Task: Task;

    /// Called whenever the agent goes back to the free list.
    fn reset(&mut self) {}
}

/// Agent behavior against a tick context `C`.
pub trait RunTask<C>: TaskAgent {
    fn start(&mut self, task: &mut Self::Task, ctx: &mut C) -> StartTaskStatus;

    /// Called each tick while the task is in flight.
    fn update(&mut self, _task: &mut Self::Task, _ctx: &mut C) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Doing,
}

/// Snapshot of one scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub serial: u64,
    pub priority: u8,
    pub status: TaskStatus,
    pub description: String,
}

impl TaskInfo {
    fn of<T: Task>(task: &T, status: TaskStatus) -> Self {
        Self {
            serial: task.serial(),
            priority: task.priority() as u8,
            status,
            description: task.description(),
        }
    }
}

pub struct TaskPool<A: TaskAgent> {
    free: Vec<A>,
    working: Vec<(A, A::Task)>,
    waiting: Vec<PrioritizedItem<A::Task>>,
    next_sequence: u64,
    paused: bool,
}

impl<A: TaskAgent> TaskPool<A> {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            working: Vec::new(),
            waiting: Vec::new(),
            next_sequence: 0,
            paused: false,
        }
    }

    pub fn add_agent(&mut self, agent: A) {
        self.free.push(agent);
    }

    /// Queue a task behind every waiting task of equal or higher priority.
    pub fn add_task(&mut self, task: A::Task) {
        let entry = PrioritizedItem {
            priority: task.priority(),
            sequence: self.next_sequence,
            item: task,
        };
        self.next_sequence += 1;
        let at = self.waiting.partition_point(|w| *w > entry);
        self.waiting.insert(at, entry);
    }

    pub fn total_agent_count(&self) -> usize {
        self.free.len() + self.working.len()
    }

    pub fn free_agent_count(&self) -> usize {
        self.free.len()
    }

    pub fn working_agent_count(&self) -> usize {
        self.working.len()
    }

    pub fn waiting_task_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Find a waiting or in-flight task.
    pub fn task_mut(&mut self, serial: u64) -> Option<&mut A::Task> {
        if let Some((_, task)) = self.working.iter_mut().find(|(_, t)| t.serial() == serial) {
            return Some(task);
        }
        self.waiting
            .iter_mut()
            .map(|w| &mut w.item)
            .find(|t| t.serial() == serial)
    }

    pub fn is_waiting(&self, serial: u64) -> bool {
        self.waiting.iter().any(|w| w.item.serial() == serial)
    }

    /// Remove matching waiting tasks. In-flight tasks are untouched.
    pub fn remove_waiting_where(&mut self, mut pred: impl FnMut(&A::Task) -> bool) -> Vec<A::Task> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.waiting.len());
        for entry in self.waiting.drain(..) {
            if pred(&entry.item) {
                removed.push(entry.item);
            } else {
                kept.push(entry);
            }
        }
        self.waiting = kept;
        removed
    }

    /// Waiting tasks first (in run order), then in-flight tasks.
    pub fn task_infos(&self) -> Vec<TaskInfo> {
        self.waiting
            .iter()
            .map(|w| TaskInfo::of(&w.item, TaskStatus::Todo))
            .chain(self.working.iter().map(|(_, t)| TaskInfo::of(t, TaskStatus::Doing)))
            .collect()
    }

    /// Drop every task and return the agents to the free list.
    pub fn clear(&mut self) -> Vec<A::Task> {
        let mut tasks: Vec<A::Task> = self.waiting.drain(..).map(|w| w.item).collect();
        for (mut agent, task) in self.working.drain(..) {
            agent.reset();
            self.free.push(agent);
            tasks.push(task);
        }
        tasks
    }

    /// Retire finished work, update in-flight work, then start waiting tasks
    /// on free agents.
    pub fn tick<C>(&mut self, ctx: &mut C)
    where
        A: RunTask<C>,
    {
        if self.paused {
            return;
        }

        let mut i = 0;
        while i < self.working.len() {
            if self.working[i].1.is_done() {
                let (mut agent, task) = self.working.remove(i);
                trace!(serial = task.serial(), "task finished");
                agent.reset();
                self.free.push(agent);
            } else {
                let (agent, task) = &mut self.working[i];
                agent.update(task, ctx);
                i += 1;
            }
        }

        let mut index = 0;
        while index < self.waiting.len() {
            let Some(mut agent) = self.free.pop() else {
                break;
            };
            let status = agent.start(&mut self.waiting[index].item, ctx);
            match status {
                StartTaskStatus::Done | StartTaskStatus::UnknownError => {
                    self.waiting.remove(index);
                    agent.reset();
                    self.free.push(agent);
                }
                StartTaskStatus::CanResume => {
                    let entry = self.waiting.remove(index);
                    self.working.push((agent, entry.item));
                }
                StartTaskStatus::HasToWait => {
                    agent.reset();
                    self.free.push(agent);
                    index += 1;
                }
            }
        }
    }
}

impl<A: TaskAgent> Default for TaskPool<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "task_pool_tests.rs"]
mod tests;
