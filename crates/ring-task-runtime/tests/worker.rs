//! Worker event-loop properties: a task resumes exactly once with the
//! kernel's result, completions observed in submission order resume
//! their tasks in that same order, and a worker with nothing left to do
//! quiesces promptly rather than blocking.

use ring_task_io::{Nop, Yield};
use ring_task_runtime::Worker;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// Every test here drives a real `io_uring`-backed `Worker` to quiescent
// shutdown, which requires `registry().ready_count() <= 1` -- two
// running concurrently would each keep the other from ever quiescing.
static TEST_LOCK: Mutex<()> = Mutex::new(());

static RESUMPTIONS: AtomicUsize = AtomicUsize::new(0);
static RESULT: AtomicI32 = AtomicI32::new(i32::MIN);

#[test]
fn task_resumes_exactly_once_with_the_kernel_result() {
    let _guard = TEST_LOCK.lock().unwrap();
    RESUMPTIONS.store(0, Ordering::SeqCst);
    RESULT.store(i32::MIN, Ordering::SeqCst);

    let worker = Worker::new(0).expect("failed to build io_uring instance");
    worker.run(async move {
        let result = Nop::new().await;
        RESUMPTIONS.fetch_add(1, Ordering::SeqCst);
        RESULT.store(result, Ordering::SeqCst);
    });

    assert_eq!(RESUMPTIONS.load(Ordering::SeqCst), 1, "no spurious resumptions");
    assert_eq!(RESULT.load(Ordering::SeqCst), 0, "a Nop completes with result 0");
}

static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());

#[test]
fn completions_resume_tasks_in_submission_order() {
    let _guard = TEST_LOCK.lock().unwrap();
    ORDER.lock().unwrap().clear();

    let worker = Worker::new(0).expect("failed to build io_uring instance");
    worker.run(async move {
        // Both detached tasks submit their Nop in the same `work()` pass
        // (the main task spawns both before yielding), so their SQEs
        // land on the ring in this order and their completions should
        // too.
        ring_task::Task::new(async move {
            Nop::new().await;
            ORDER.lock().unwrap().push(1);
        })
        .detach();
        ring_task::Task::new(async move {
            Nop::new().await;
            ORDER.lock().unwrap().push(2);
        })
        .detach();
    });

    assert_eq!(
        *ORDER.lock().unwrap(),
        vec![1, 2],
        "tasks should resume in the order their completions were observed"
    );
}

#[test]
fn yield_resumes_without_a_task_info_allocation() {
    let _guard = TEST_LOCK.lock().unwrap();
    RESUMPTIONS.store(0, Ordering::SeqCst);

    let worker = Worker::new(0).expect("failed to build io_uring instance");
    worker.run(async move {
        Yield::new().await;
        RESUMPTIONS.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(RESUMPTIONS.load(Ordering::SeqCst), 1, "task resumes exactly once after yielding");
}

#[test]
fn quiescent_shutdown_does_not_block_once_work_is_done() {
    let _guard = TEST_LOCK.lock().unwrap();

    let worker = Worker::new(0).expect("failed to build io_uring instance");
    let start = Instant::now();
    worker.run(async move {});
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_millis(500),
        "a worker with no pending I/O and no ready work should quiesce almost \
         immediately instead of blocking, took {elapsed:?}"
    );
}
