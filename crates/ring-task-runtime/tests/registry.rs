//! Cross-worker delivery and the startup barrier, exercised together
//! against two real workers.
//!
//! This file intentionally holds a single test. The runtime's sole
//! quiescent-shutdown trigger is `registry().ready_count() <= 1`
//! (`Worker::complete`); with two workers genuinely alive at once that
//! can never become true for either of them (each is the other's reason
//! `ready_count` stays at 2), so two concurrently-running workers as set
//! up here cannot both cleanly return from `Worker::run`. A second test
//! in this file would race that same unresolved `ready_count` against
//! this one's leftover threads. The properties under test -- a task
//! reaches the right worker's ready queue exactly once, and a task
//! staged before its target starts waits for the target's startup
//! barrier -- are fully observable without ever joining either thread,
//! so this test doesn't try to.
use ring_task_runtime::{current_worker_id, spawn_on, Worker};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn cross_worker_post_respects_the_startup_barrier_and_runs_exactly_once() {
    let (tx, rx) = mpsc::channel::<(&'static str, Option<u8>)>();

    // Worker 1 is constructed (registered with the registry as
    // "created") but its thread hasn't started, so its ring_fd is not
    // yet known: `spawn_on` below cannot take the live cross-ring path
    // and must stage this task instead.
    let worker1 = Worker::new(1).expect("failed to build io_uring instance for worker 1");

    let tx_early = tx.clone();
    spawn_on(1, async move {
        let _ = tx_early.send(("staged-before-start", current_worker_id()));
    });

    // Nothing has run yet: no worker thread exists at all.
    assert!(
        rx.try_recv().is_err(),
        "a task staged before its target worker starts must not run yet"
    );

    let _worker1_thread = thread::spawn(move || {
        worker1.run(async {});
    });

    let worker0 = Worker::new(0).expect("failed to build io_uring instance for worker 0");
    let tx_cross = tx.clone();
    let _worker0_thread = thread::spawn(move || {
        worker0.run(async move {
            // Real cross-ring post: worker 0 is alive on its own thread
            // and worker 1 is (or is about to become) a registered
            // target, so this goes out over `msg_ring` rather than the
            // staging path.
            spawn_on(1, async move {
                let _ = tx_cross.send(("cross-posted", current_worker_id()));
            });
        });
    });

    let mut seen = Vec::new();
    for _ in 0..2 {
        match rx.recv_timeout(Duration::from_secs(2)) {
            Ok(msg) => seen.push(msg),
            Err(_) => panic!("timed out waiting for both tasks to reach worker 1; got {seen:?}"),
        }
    }

    assert_eq!(seen.len(), 2);
    for (label, worker_id) in &seen {
        assert_eq!(
            *worker_id,
            Some(1),
            "{label} task should have executed on worker 1's own thread"
        );
    }

    // Neither worker thread is joined: see the module comment. Both
    // threads are killed when this test binary's process exits.
}
