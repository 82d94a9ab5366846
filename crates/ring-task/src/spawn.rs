//! The thread-local hook `Task::detach` uses to hand a boxed future off
//! to whichever worker owns the current thread, without `ring-task`
//! depending on `ring-task-runtime` (which depends on `ring-task`).
//!
//! `ring-task-runtime::Worker::run` installs this hook before entering
//! its event loop and clears it on teardown, the same way
//! `ring_task_core::kprint::set_worker_id` tags the thread for logging.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;

/// A detached task's future, erased to its unit-output, boxed form.
pub type BoxedUnitFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

thread_local! {
    static SPAWN_HOOK: Cell<Option<fn(BoxedUnitFuture)>> = const { Cell::new(None) };
}

/// Install the function the current thread's worker uses to accept
/// detached tasks. Only one hook is live per thread; installing a new
/// one replaces the last.
pub fn set_spawn_hook(hook: fn(BoxedUnitFuture)) {
    SPAWN_HOOK.with(|h| h.set(Some(hook)));
}

/// Remove the current thread's spawn hook.
pub fn clear_spawn_hook() {
    SPAWN_HOOK.with(|h| h.set(None));
}

/// Hand `future` to the current thread's installed hook.
///
/// # Panics
///
/// Panics if no worker has installed a spawn hook on this thread --
/// `detach()` called off a worker thread has nowhere to send its task.
pub(crate) fn spawn_detached(future: BoxedUnitFuture) {
    SPAWN_HOOK.with(|h| match h.get() {
        Some(hook) => hook(future),
        None => panic!("Task::detach called on a thread with no worker spawn hook installed"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    static CALLED: AtomicBool = AtomicBool::new(false);

    fn record_hook(_fut: BoxedUnitFuture) {
        CALLED.store(true, Ordering::SeqCst);
    }

    #[test]
    fn hook_receives_spawned_future() {
        CALLED.store(false, Ordering::SeqCst);
        set_spawn_hook(record_hook);
        spawn_detached(Box::pin(async {}));
        assert!(CALLED.load(Ordering::SeqCst));
        clear_spawn_hook();
    }

    #[test]
    #[should_panic(expected = "no worker spawn hook")]
    fn missing_hook_panics() {
        clear_spawn_hook();
        spawn_detached(Box::pin(async {}));
    }
}
