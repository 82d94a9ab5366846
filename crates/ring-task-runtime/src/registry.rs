//! The process-wide worker registry: how many workers exist, which of
//! them have started their loop, and how to hand a task to one of them
//! from any thread.
//!
//! A single, process-wide instance (a `OnceLock`) tracking
//! `created_count`/`ready_count` behind a mutex + condvar, used both as
//! the startup barrier and as the directory `spawn_on` consults to decide
//! how to reach a target worker.

use io_uring::{opcode, types};
use ring_task_core::config::{WorkerId, MAX_WORKERS};
use ring_task_core::error::{Result, RuntimeError};
use ring_task_core::task_info::{encode_waker_for_msg_ring, nop_user_data};
use ring_task_core::kwarn;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::task::Waker;
use std::time::Duration;

use crate::tls;
use crate::worker::Runnable;

/// How long the startup barrier waits for every constructed worker to
/// report ready before giving up. Mirrors the ~1 second the original
/// allots `io_context_meta_type::wait_all_ready`.
const STARTUP_BARRIER_TIMEOUT: Duration = Duration::from_secs(1);

struct RegistryState {
    created_count: u8,
    ready_count: u8,
    ring_fds: Vec<Option<RawFd>>,
    /// Tasks spawned onto a worker that hasn't registered a ring yet
    /// (construction-time seeding, before any worker thread is
    /// running). Drained into the target's ready queue the moment it
    /// calls `worker_ready`.
    pending: Vec<Vec<Arc<Runnable>>>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            created_count: 0,
            ready_count: 0,
            ring_fds: vec![None; MAX_WORKERS],
            pending: (0..MAX_WORKERS).map(|_| Vec::new()).collect(),
        }
    }
}

pub struct Registry {
    state: Mutex<RegistryState>,
    cv: Condvar,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, created on first access.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        state: Mutex::new(RegistryState::new()),
        cv: Condvar::new(),
    })
}

impl Registry {
    /// A worker has been constructed (but not necessarily started).
    pub(crate) fn worker_created(&self) {
        let mut s = self.state.lock().unwrap();
        s.created_count += 1;
        self.cv.notify_all();
    }

    /// A worker is about to enter its event loop. Records its ring fd
    /// for cross-posting and returns any tasks staged for it while it
    /// had none.
    pub(crate) fn worker_ready(&self, id: WorkerId, ring_fd: RawFd) -> Vec<Arc<Runnable>> {
        let mut s = self.state.lock().unwrap();
        s.ring_fds[id as usize] = Some(ring_fd);
        s.ready_count += 1;
        self.cv.notify_all();
        std::mem::take(&mut s.pending[id as usize])
    }

    /// A worker's loop has gone quiescent and returned.
    pub(crate) fn worker_stopped(&self, id: WorkerId) {
        let mut s = self.state.lock().unwrap();
        s.ring_fds[id as usize] = None;
        s.ready_count = s.ready_count.saturating_sub(1);
        s.created_count = s.created_count.saturating_sub(1);
        self.cv.notify_all();
    }

    /// Number of workers currently running their event loop.
    pub fn ready_count(&self) -> u8 {
        self.state.lock().unwrap().ready_count
    }

    /// Block until every constructed worker has reported ready, or
    /// [`STARTUP_BARRIER_TIMEOUT`] elapses.
    pub(crate) fn wait_for_startup_barrier(&self) -> Result<()> {
        let guard = self.state.lock().unwrap();
        let (guard, wait_result) = self
            .cv
            .wait_timeout_while(guard, STARTUP_BARRIER_TIMEOUT, |s| {
                s.created_count != s.ready_count
            })
            .unwrap();
        if wait_result.timed_out() {
            return Err(RuntimeError::StartupTimeout {
                expected: guard.created_count,
                ready: guard.ready_count,
            });
        }
        Ok(())
    }

    /// Hand `runnable` to worker `target`. Mirrors `co_spawn_auto`'s
    /// three-way choice: inline if we're already on `target`'s thread,
    /// staged if `target` hasn't started its ring yet (nobody else can
    /// be racing us for it), otherwise a cross-ring `msg_ring` post.
    pub(crate) fn spawn_on(&self, target: WorkerId, runnable: Arc<Runnable>) {
        if tls::current_worker_id() == Some(target) {
            tls::push_ready_local(runnable);
            return;
        }

        let ring_fd = self.state.lock().unwrap().ring_fds[target as usize];
        match ring_fd {
            Some(fd) => {
                if let Err(e) = self.post_cross_ring(target, fd, runnable) {
                    kwarn!("spawn_on({target}): {e}");
                }
            }
            None => {
                let mut s = self.state.lock().unwrap();
                // Re-check under the lock: the target may have become
                // ready between the read above and taking the lock.
                if let Some(fd) = s.ring_fds[target as usize] {
                    drop(s);
                    if let Err(e) = self.post_cross_ring(target, fd, runnable) {
                        kwarn!("spawn_on({target}): {e}");
                    }
                } else {
                    s.pending[target as usize].push(runnable);
                }
            }
        }
    }

    /// Submit a `msg_ring` SQE on the *caller's own* ring, targeting
    /// `target_fd`, whose `data` payload is `runnable` boxed as a
    /// `Waker`. The target worker's completion queue receives a CQE
    /// tagged `MsgRingDelivery` carrying that same value.
    fn post_cross_ring(&self, target: WorkerId, target_fd: RawFd, runnable: Arc<Runnable>) -> Result<()> {
        let waker = Waker::from(runnable);
        let payload = encode_waker_for_msg_ring(waker);
        let entry = opcode::MsgRing::new(types::Fd(target_fd), 0, payload)
            .build()
            .user_data(nop_user_data());
        tls::submit_entry(entry).map_err(|_| RuntimeError::CrossPostFailed {
            target,
            errno: libc::ENOSPC,
        })
    }
}
