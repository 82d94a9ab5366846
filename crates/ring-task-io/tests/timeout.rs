//! S3: three timeouts run sequentially take as long as their sum; the
//! same three timeouts submitted as a hard-linked chain take the same
//! total wall time, because the kernel still executes a linked chain's
//! `Timeout` entries one after another rather than concurrently.
//!
//! Durations are scaled down by 10x from the literal 1s/2s/3s (1s/2s/3s
//! sequential and again hard-linked, ~12s total) to 100ms/200ms/300ms, so
//! this test runs in ~1.2s instead -- the ordering property under test
//! doesn't depend on the absolute magnitude.

use ring_task_core::error::is_timeout;
use ring_task_io::{Linked, Timeout};
use ring_task_runtime::Worker;
use std::sync::Mutex;
use std::time::{Duration, Instant};

static TEST_LOCK: Mutex<()> = Mutex::new(());

const STEP_NANOS: [u32; 3] = [100_000_000, 200_000_000, 300_000_000];
const TOTAL: Duration = Duration::from_millis(600);
const TOLERANCE: Duration = Duration::from_millis(100);

#[test]
fn sequential_timeouts_sum_their_durations() {
    let _guard = TEST_LOCK.lock().unwrap();

    let worker = Worker::new(0).expect("failed to build io_uring instance");
    let start = Instant::now();
    worker.run(async move {
        for nanos in STEP_NANOS {
            let result = Timeout::new(0, nanos).await;
            assert!(is_timeout(result), "expected -ETIME, got {result}");
        }
    });
    let elapsed = start.elapsed();

    assert!(
        elapsed >= TOTAL.saturating_sub(TOLERANCE) && elapsed <= TOTAL + TOLERANCE,
        "sequential timeouts took {elapsed:?}, expected ~{TOTAL:?}"
    );
}

#[test]
fn hard_linked_timeouts_also_sum_their_durations() {
    let _guard = TEST_LOCK.lock().unwrap();

    let worker = Worker::new(0).expect("failed to build io_uring instance");
    let start = Instant::now();
    worker.run(async move {
        let chain: Linked = Timeout::new(0, STEP_NANOS[0]) & Timeout::new(0, STEP_NANOS[1]) & Timeout::new(0, STEP_NANOS[2]);
        let result = chain.await;
        assert!(is_timeout(result), "expected the final linked stage to time out, got {result}");
    });
    let elapsed = start.elapsed();

    assert!(
        elapsed >= TOTAL.saturating_sub(TOLERANCE) && elapsed <= TOTAL + TOLERANCE,
        "hard-linked timeouts took {elapsed:?}, expected ~{TOTAL:?}"
    );
}
