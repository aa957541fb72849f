//! Task pool benchmarks.
//!
//! Measures queue insertion by priority and full drain throughput through a
//! fixed set of agents.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use resvault::scheduler::{Priority, RunTask, StartTaskStatus, Task, TaskAgent, TaskPool};

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

struct Agent;

impl TaskAgent for Agent {
    type Task = Job;
}

/// Every other job finishes on start; the rest finish on the next update.
impl RunTask<u64> for Agent {
    fn start(&mut self, task: &mut Job, completed: &mut u64) -> StartTaskStatus {
        if task.serial % 2 == 0 {
            task.done = true;
            *completed += 1;
            return StartTaskStatus::Done;
        }
        StartTaskStatus::CanResume
    }

    fn update(&mut self, task: &mut Job, completed: &mut u64) {
        task.done = true;
        *completed += 1;
    }
}

fn job(serial: u64) -> Job {
    Job {
        serial,
        priority: Priority::from((serial % 4) as u8),
        done: false,
    }
}

fn bench_add_task(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_pool_add");

    for queued in [0u64, 100, 1_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("add", queued), |b| {
            let mut pool: TaskPool<Agent> = TaskPool::new();
            for i in 0..queued {
                pool.add_task(job(i));
            }
            let mut serial = queued;
            b.iter(|| {
                pool.add_task(black_box(job(serial)));
                serial += 1;
                let _ = pool.remove_waiting_where(|t| t.serial == serial - 1);
            })
        });
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_pool_drain");

    for (agents, jobs) in [(3usize, 1_000u64), (8, 1_000), (8, 10_000)] {
        group.throughput(Throughput::Elements(jobs));
        group.bench_function(BenchmarkId::new(format!("{agents}_agents"), jobs), |b| {
            b.iter(|| {
                let mut pool: TaskPool<Agent> = TaskPool::new();
                for _ in 0..agents {
                    pool.add_agent(Agent);
                }
                for i in 0..jobs {
                    pool.add_task(job(i));
                }
                let mut completed = 0u64;
                while completed < jobs {
                    pool.tick(&mut completed);
                }
                black_box(completed)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add_task, bench_drain);
criterion_main!(benches);
