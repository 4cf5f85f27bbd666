//! Worker pool tests against real child processes
//!
//! These tests verify:
//! - The concurrency ceiling holds for truly live processes
//! - Every submitted task is reported exactly once
//! - Queued tasks launch in FIFO order
//! - Two jobs over four equal tasks take about two batches of time
//! - A short task is not charged for a longer neighbour
//! - An interrupt stops queued launches but lets running tasks finish

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use runkit::process_guard::is_process_alive;
use runkit::{RunkitError, Task, WorkerPool};

fn fast_pool(max_jobs: usize) -> WorkerPool {
    WorkerPool::new(max_jobs)
        .expect("valid pool")
        .with_poll_interval(Duration::from_millis(10))
}

// =============================================================================
// Ceiling
// =============================================================================

#[test]
fn test_live_processes_never_exceed_max_jobs() {
    for max_jobs in [1, 2, 3] {
        let tasks = (0..6).map(|_| Task::shell("sleep 0.15")).collect();
        let mut peak = 0;

        fast_pool(max_jobs)
            .run_observed(tasks, |snap| {
                let live = snap
                    .running_pids
                    .iter()
                    .filter(|&&pid| is_process_alive(pid))
                    .count();
                assert!(
                    live <= max_jobs,
                    "{} live processes with max_jobs={}",
                    live,
                    max_jobs
                );
                peak = peak.max(snap.running_pids.len());
            })
            .expect("pool run");

        assert_eq!(peak, max_jobs);
    }
}

#[test]
fn test_ceiling_seen_from_inside_the_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let active = dir.path().join("active");
    std::fs::create_dir(&active).unwrap();
    let counts = dir.path().join("counts");

    // Each task marks itself active, records how many are active, and
    // unmarks itself before exiting.
    let line = format!(
        "touch {a}/$$; ls {a} | wc -l >> {c}; sleep 0.2; rm {a}/$$",
        a = active.display(),
        c = counts.display()
    );
    let tasks = (0..8).map(|_| Task::shell(line.clone())).collect();

    let results = fast_pool(3).run(tasks).unwrap();
    assert!(results.iter().all(|r| r.success()));

    let recorded = std::fs::read_to_string(&counts).unwrap();
    let seen: Vec<usize> = recorded
        .lines()
        .map(|l| l.trim().parse().unwrap())
        .collect();
    assert_eq!(seen.len(), 8);
    assert!(seen.iter().all(|&n| (1..=3).contains(&n)), "counts: {:?}", seen);
}

// =============================================================================
// Completeness and ordering
// =============================================================================

#[test]
fn test_one_result_per_task() {
    let lines: Vec<String> = (0..7)
        .map(|i| format!("sleep 0.0{}; exit {}", 7 - i, i))
        .collect();
    let tasks = lines.iter().cloned().map(Task::shell).collect();

    let results = fast_pool(3).run(tasks).unwrap();
    assert_eq!(results.len(), 7);

    let mut by_line: HashMap<String, i32> = HashMap::new();
    for r in &results {
        assert!(by_line.insert(r.command_line.clone(), r.exit_code).is_none());
    }
    for (i, line) in lines.iter().enumerate() {
        let key = Task::shell(line.clone()).command_line();
        assert_eq!(by_line.get(&key), Some(&(i as i32)));
    }
}

#[test]
fn test_fifo_launch_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order");
    let tasks = (0..5)
        .map(|i| Task::shell(format!("echo {} >> {}", i, log.display())))
        .collect();

    fast_pool(1).run(tasks).unwrap();

    let order = std::fs::read_to_string(&log).unwrap();
    assert_eq!(order.lines().collect::<Vec<_>>(), vec!["0", "1", "2", "3", "4"]);
}

#[test]
fn test_nonzero_exits_reported_not_fatal() {
    let tasks = vec![
        Task::shell("exit 2"),
        Task::shell("sleep 0.1"),
        Task::shell("exit 9"),
    ];
    let results = fast_pool(2).run(tasks).unwrap();
    let failed: Vec<i32> = {
        let mut v: Vec<i32> = results
            .iter()
            .filter(|r| !r.success())
            .map(|r| r.exit_code)
            .collect();
        v.sort();
        v
    };
    assert_eq!(failed, vec![2, 9]);
}

#[test]
fn test_spawn_failure_aborts_after_draining() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("finished");
    let tasks = vec![
        Task::shell(format!("sleep 0.2; touch {}", marker.display())),
        Task::new("/no/such/program", Vec::<String>::new()),
    ];

    let err = fast_pool(2).run(tasks).unwrap_err();
    assert!(matches!(err, RunkitError::TaskSpawnFailure { .. }));
    assert!(err.is_fatal());
    // The task already running was allowed to finish
    assert!(marker.exists());
}

#[test]
fn test_interrupt_stops_queued_launches() {
    let dir = tempfile::tempdir().unwrap();
    let markers: Vec<_> = (0..3).map(|i| dir.path().join(format!("ran-{i}"))).collect();
    let tasks = markers
        .iter()
        .map(|m| Task::shell(format!("sleep 0.1; touch {}", m.display())))
        .collect();

    let flag = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&flag);
    let err = fast_pool(1)
        .with_interrupt_flag(flag)
        .run_observed(tasks, |snap| {
            if !snap.running_pids.is_empty() {
                trigger.store(true, Ordering::SeqCst);
            }
        })
        .unwrap_err();

    assert!(matches!(err, RunkitError::Interrupted { not_started: 2 }));
    assert_eq!(err.exit_code(), 130);
    // The running task finished; nothing queued was started
    assert!(markers[0].exists());
    assert!(!markers[1].exists());
    assert!(!markers[2].exists());
}

// =============================================================================
// Timing
// =============================================================================

#[test]
fn test_two_jobs_four_tasks_run_in_two_batches() {
    let tasks = (0..4).map(|_| Task::shell("sleep 0.5")).collect();

    let start = Instant::now();
    let results = fast_pool(2).run(tasks).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 4);
    assert!(elapsed >= Duration::from_millis(1000), "too fast: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1900), "too slow: {:?}", elapsed);
    for r in &results {
        assert!(r.duration >= Duration::from_millis(500));
    }
}

#[test]
fn test_short_task_duration_not_inflated_by_long_neighbour() {
    let tasks = vec![Task::shell("sleep 1.5"), Task::shell("sleep 0.1")];
    let results = fast_pool(2).run(tasks).unwrap();

    assert_eq!(results.len(), 2);
    let short = results
        .iter()
        .find(|r| r.command_line.contains("sleep 0.1"))
        .expect("short task reported");
    let long = results
        .iter()
        .find(|r| r.command_line.contains("sleep 1.5"))
        .expect("long task reported");
    assert!(short.duration < Duration::from_millis(600), "{:?}", short.duration);
    assert!(long.duration >= Duration::from_millis(1500));
}
