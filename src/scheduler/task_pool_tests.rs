use super::*;
use std::collections::HashSet;

#[derive(Debug)]
struct Job {
    serial: u64,
    priority: Priority,
    done: bool,
}

impl Task for Job {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn description(&self) -> String {
        format!("job {}", self.serial)
    }
}

/// Scripted outcomes keyed by serial; unknown serials resume.
#[derive(Default)]
struct Script {
    blocked: HashSet<u64>,
    sync_done: HashSet<u64>,
    failing: HashSet<u64>,
    started: Vec<u64>,
    updates: usize,
}

#[derive(Default)]
struct Agent {
    resets: usize,
}

impl TaskAgent for Agent {
    type Task = Job;

    fn reset(&mut self) {
        self.resets += 1;
    }
}

impl RunTask<Script> for Agent {
    fn start(&mut self, task: &mut Job, ctx: &mut Script) -> StartTaskStatus {
        if ctx.blocked.contains(&task.serial) {
            return StartTaskStatus::HasToWait;
        }
        ctx.started.push(task.serial);
        if ctx.sync_done.contains(&task.serial) {
            task.done = true;
            return StartTaskStatus::Done;
        }
        if ctx.failing.contains(&task.serial) {
            task.done = true;
            return StartTaskStatus::UnknownError;
        }
        StartTaskStatus::CanResume
    }

    fn update(&mut self, _task: &mut Job, ctx: &mut Script) {
        ctx.updates += 1;
    }
}

fn job(serial: u64, priority: Priority) -> Job {
    Job {
        serial,
        priority,
        done: false,
    }
}

fn pool(agents: usize) -> TaskPool<Agent> {
    let mut pool = TaskPool::new();
    for _ in 0..agents {
        pool.add_agent(Agent::default());
    }
    pool
}

#[test]
fn starts_highest_priority_first() {
    let mut pool = pool(1);
    pool.add_task(job(1, Priority::Low));
    pool.add_task(job(2, Priority::High));
    pool.add_task(job(3, Priority::Normal));

    let mut script = Script::default();
    pool.tick(&mut script);
    assert_eq!(script.started, vec![2]);
    assert_eq!(pool.working_agent_count(), 1);
    assert_eq!(pool.waiting_task_count(), 2);
}

#[test]
fn equal_priority_is_fifo() {
    let mut pool = pool(3);
    for serial in 1..=3 {
        pool.add_task(job(serial, Priority::Normal));
    }
    let mut script = Script::default();
    pool.tick(&mut script);
    assert_eq!(script.started, vec![1, 2, 3]);
}

#[test]
fn has_to_wait_keeps_position_and_frees_agent() {
    let mut pool = pool(1);
    pool.add_task(job(1, Priority::Normal));
    pool.add_task(job(2, Priority::Normal));

    let mut script = Script::default();
    script.blocked.insert(1);
    pool.tick(&mut script);
    assert_eq!(script.started, vec![2]);

    let infos = pool.task_infos();
    assert_eq!(infos[0].serial, 1);
    assert_eq!(infos[0].status, TaskStatus::Todo);
    assert_eq!(infos[1].status, TaskStatus::Doing);

    pool.task_mut(2).unwrap().done = true;
    script.blocked.clear();
    pool.tick(&mut script);
    assert_eq!(script.started, vec![2, 1]);
}

#[test]
fn done_and_error_free_the_agent_immediately() {
    let mut pool = pool(1);
    pool.add_task(job(1, Priority::Normal));
    pool.add_task(job(2, Priority::Normal));
    pool.add_task(job(3, Priority::Normal));

    let mut script = Script::default();
    script.sync_done.insert(1);
    script.failing.insert(2);
    pool.tick(&mut script);
    assert_eq!(script.started, vec![1, 2, 3]);
    assert_eq!(pool.waiting_task_count(), 0);
    assert_eq!(pool.working_agent_count(), 1);
}

#[test]
fn finished_work_is_retired_and_running_work_updated() {
    let mut pool = pool(2);
    pool.add_task(job(1, Priority::Normal));
    pool.add_task(job(2, Priority::Normal));
    let mut script = Script::default();
    pool.tick(&mut script);
    assert_eq!(pool.free_agent_count(), 0);

    pool.task_mut(1).unwrap().done = true;
    pool.tick(&mut script);
    assert_eq!(script.updates, 1);
    assert_eq!(pool.free_agent_count(), 1);
    assert_eq!(pool.total_agent_count(), 2);
}

#[test]
fn paused_pool_does_nothing() {
    let mut pool = pool(1);
    pool.add_task(job(1, Priority::Normal));
    pool.pause();
    let mut script = Script::default();
    pool.tick(&mut script);
    assert!(script.started.is_empty());
    pool.resume();
    pool.tick(&mut script);
    assert_eq!(script.started, vec![1]);
}

#[test]
fn remove_waiting_leaves_in_flight_alone() {
    let mut pool = pool(1);
    pool.add_task(job(1, Priority::Normal));
    pool.add_task(job(2, Priority::Normal));
    pool.add_task(job(3, Priority::Normal));
    let mut script = Script::default();
    pool.tick(&mut script);

    let removed = pool.remove_waiting_where(|t| t.serial != 3);
    assert_eq!(removed.iter().map(|t| t.serial).collect::<Vec<_>>(), vec![2]);
    assert!(pool.is_waiting(3));
    assert!(pool.task_mut(1).is_some());
}

#[test]
fn clear_returns_every_task_and_agent() {
    let mut pool = pool(1);
    pool.add_task(job(1, Priority::Normal));
    pool.add_task(job(2, Priority::Normal));
    let mut script = Script::default();
    pool.tick(&mut script);

    let tasks = pool.clear();
    assert_eq!(tasks.len(), 2);
    assert_eq!(pool.free_agent_count(), 1);
    assert_eq!(pool.waiting_task_count(), 0);
}
