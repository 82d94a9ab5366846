//! Single-producer single-consumer ring cursor and the ready queue built
//! on top of it.
//!
//! A fixed, power-of-two capacity ring indexed by a head and a tail, each
//! only ever advanced by one side. A const generic selects whether the
//! cursor needs to be safe to publish across threads. Every ready queue
//! this runtime actually builds is genuinely single-producer
//! single-consumer on one thread — a worker only ever pops its own
//! queue, and cross-worker hand-off goes through the kernel's
//! `msg_ring`, never through a shared cursor — so `SAFE = false` (plain
//! relaxed loads/stores) is what gets instantiated everywhere except
//! tests, which exercise `SAFE = true` to prove the cursor is still
//! correct if a caller ever does share it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread::{self, Thread};

/// Head/tail index pair for a ring of capacity `N`, which must be a
/// power of two. Indices only ever increase (wrapping at `u32::MAX`)
/// and are masked down to a slot on access, so `push`/`pop` never need
/// to special-case wraparound.
///
/// `SAFE` selects the memory ordering `load`/`store` use: `Acquire`/
/// `Release` when `true`, `Relaxed` when `false`. Both are backed by an
/// `AtomicU32` either way — on a single thread the ordering is free, so
/// there's no reason for two storage representations, only two
/// visibility contracts. `SAFE` also gates whether `wait_for_available`/
/// `wait_for_not_empty` park: in unsafe (single-thread) mode there is no
/// second thread to wake them, so they spin instead.
pub struct SpscCursor<const N: u32, const SAFE: bool> {
    head: AtomicU32,
    tail: AtomicU32,
    consumer_waiter: Mutex<Option<Thread>>,
    producer_waiter: Mutex<Option<Thread>>,
}

impl<const N: u32, const SAFE: bool> SpscCursor<N, SAFE> {
    const MASK: u32 = N - 1;

    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "cursor capacity must be a power of two");
        Self {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            consumer_waiter: Mutex::new(None),
            producer_waiter: Mutex::new(None),
        }
    }

    #[inline]
    fn load_order() -> Ordering {
        if SAFE { Ordering::Acquire } else { Ordering::Relaxed }
    }

    #[inline]
    fn store_order() -> Ordering {
        if SAFE { Ordering::Release } else { Ordering::Relaxed }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> u32 {
        self.tail
            .load(Self::load_order())
            .wrapping_sub(self.head.load(Self::load_order()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Reserve the next tail slot for the producer, returning its index
    /// within the backing array (already masked), or `None` if the ring
    /// is full.
    pub fn reserve_push(&self) -> Option<u32> {
        if self.is_full() {
            return None;
        }
        let tail = self.tail.load(Self::load_order());
        Some(tail & Self::MASK)
    }

    /// Commit a previously reserved push by advancing the tail, then
    /// wake a consumer parked in `wait_for_not_empty` if there is one
    /// (`push_notify`).
    pub fn commit_push(&self) {
        let tail = self.tail.load(Ordering::Relaxed);
        self.tail.store(tail.wrapping_add(1), Self::store_order());
        if SAFE {
            if let Some(waiter) = self.consumer_waiter.lock().unwrap().take() {
                waiter.unpark();
            }
        }
    }

    /// Reserve the next head slot for the consumer, returning its index
    /// within the backing array (already masked), or `None` if the ring
    /// is empty.
    pub fn reserve_pop(&self) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        let head = self.head.load(Self::load_order());
        Some(head & Self::MASK)
    }

    /// Commit a previously reserved pop by advancing the head, then wake
    /// a producer parked in `wait_for_available` if there is one
    /// (`pop_notify`).
    pub fn commit_pop(&self) {
        let head = self.head.load(Ordering::Relaxed);
        self.head.store(head.wrapping_add(1), Self::store_order());
        if SAFE {
            if let Some(waiter) = self.producer_waiter.lock().unwrap().take() {
                waiter.unpark();
            }
        }
    }

    /// Block the calling thread until `tail - head < N` (a push would
    /// succeed). In unsafe (single-thread) mode there's no second thread
    /// to notify a parked waiter, so this spins instead.
    pub fn wait_for_available(&self) {
        loop {
            if !self.is_full() {
                return;
            }
            if !SAFE {
                std::hint::spin_loop();
                continue;
            }
            *self.producer_waiter.lock().unwrap() = Some(thread::current());
            if !self.is_full() {
                *self.producer_waiter.lock().unwrap() = None;
                return;
            }
            thread::park();
        }
    }

    /// Block the calling thread until `tail > head` (a pop would
    /// succeed). In unsafe (single-thread) mode this spins, for the same
    /// reason as `wait_for_available`.
    pub fn wait_for_not_empty(&self) {
        loop {
            if !self.is_empty() {
                return;
            }
            if !SAFE {
                std::hint::spin_loop();
                continue;
            }
            *self.consumer_waiter.lock().unwrap() = Some(thread::current());
            if !self.is_empty() {
                *self.consumer_waiter.lock().unwrap() = None;
                return;
            }
            thread::park();
        }
    }
}

impl<const N: u32, const SAFE: bool> Default for SpscCursor<N, SAFE> {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed-capacity SPSC queue of `T`, built on `SpscCursor`. This is
/// what each worker's ready queue actually is: `T = *mut TaskInfo` in
/// `ring-task-runtime::worker`.
///
/// Default capacity is `ring_task_core::config::SWAP_CAPACITY` (16384);
/// callers needing a different size pick their own `N`.
pub struct ReadyQueue<T, const N: u32 = { crate::config::SWAP_CAPACITY }, const SAFE: bool = false> {
    cursor: SpscCursor<N, SAFE>,
    slots: Box<[Option<T>]>,
}

impl<T, const N: u32, const SAFE: bool> ReadyQueue<T, N, SAFE> {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(N as usize);
        slots.resize_with(N as usize, || None);
        Self {
            cursor: SpscCursor::new(),
            slots: slots.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> u32 {
        self.cursor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.cursor.is_full()
    }

    /// Block until a push onto this queue would succeed.
    pub fn wait_for_available(&self) {
        self.cursor.wait_for_available();
    }

    /// Block until a pop off this queue would succeed.
    pub fn wait_for_not_empty(&self) {
        self.cursor.wait_for_not_empty();
    }

    /// Push a value onto the queue. Returns the value back if the queue
    /// is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        match self.cursor.reserve_push() {
            Some(slot) => {
                self.slots[slot as usize] = Some(value);
                self.cursor.commit_push();
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Pop the oldest value off the queue, if any.
    pub fn pop(&mut self) -> Option<T> {
        let slot = self.cursor.reserve_pop()?;
        let value = self.slots[slot as usize].take();
        self.cursor.commit_pop();
        value
    }
}

impl<T, const N: u32, const SAFE: bool> Default for ReadyQueue<T, N, SAFE> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_preserves_fifo_order() {
        let mut q: ReadyQueue<i32, 4, false> = ReadyQueue::new();
        assert!(q.push(1).is_ok());
        assert!(q.push(2).is_ok());
        assert!(q.push(3).is_ok());
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert!(q.push(4).is_ok());
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(4));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_fails_when_full_and_value_is_returned() {
        let mut q: ReadyQueue<i32, 2, false> = ReadyQueue::new();
        assert!(q.push(1).is_ok());
        assert!(q.push(2).is_ok());
        assert_eq!(q.push(3), Err(3));
    }

    #[test]
    fn len_tracks_pending_items() {
        let mut q: ReadyQueue<i32, 8, false> = ReadyQueue::new();
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.len(), 2);
        q.pop();
        assert_eq!(q.len(), 1);
        assert!(!q.is_full());
    }

    #[test]
    fn cursor_wraps_around_capacity_boundary() {
        let mut q: ReadyQueue<i32, 2, true> = ReadyQueue::new();
        for round in 0..100 {
            q.push(round).unwrap();
            assert_eq!(q.pop(), Some(round));
        }
    }

    #[test]
    fn wait_for_not_empty_returns_immediately_when_already_populated() {
        let mut q: ReadyQueue<i32, 4, false> = ReadyQueue::new();
        q.push(1).unwrap();
        q.wait_for_not_empty();
    }

    #[test]
    fn wait_for_available_returns_immediately_when_already_has_room() {
        let q: ReadyQueue<i32, 4, false> = ReadyQueue::new();
        q.wait_for_available();
    }

    #[test]
    fn wait_for_not_empty_wakes_once_another_thread_pushes() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        // `SpscCursor`'s `reserve_push`/`commit_push` only need `&self`,
        // so the producer can share it through an `Arc` with no `&mut`
        // aliasing concerns, unlike `ReadyQueue::push`.
        let cursor: Arc<SpscCursor<4, true>> = Arc::new(SpscCursor::new());
        let producer = {
            let cursor = Arc::clone(&cursor);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cursor.reserve_push().expect("cursor should have room");
                cursor.commit_push();
            })
        };

        cursor.wait_for_not_empty();
        producer.join().unwrap();
        assert!(!cursor.is_empty());
    }
}
