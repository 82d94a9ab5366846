//! `TaskInfo` and the tagged 64-bit `user_data` encoding used to correlate
//! a completion queue entry back to the task awaiting it.
//!
//! `TaskInfo` stores a `std::task::Waker` in its resumption slot -- the
//! idiomatic Rust stand-in for a resumable coroutine frame handle.

use std::task::Waker;

/// A boxed, heap-stable record an I/O awaitable leaves behind across a
/// `co_await` suspension point. Its address (not its contents) is what
/// gets packed into an SQE's `user_data`; the kernel hands that address
/// back unchanged in the matching CQE, and `Worker::handle_cqe` recovers
/// this struct from it.
///
/// `#[repr(align(8))]` guarantees the low 3 bits of any `TaskInfo` pointer
/// are zero, which is what makes room for the tag in `UserDataTag`.
#[repr(align(8))]
pub struct TaskInfo {
    /// The waker to invoke once `result` has been filled in. `None` until
    /// the awaiting future's first `poll` call stores one.
    pub waker: Option<Waker>,
    /// The completion's `res` field, straight from the kernel. Negative
    /// values are `-errno`.
    pub result: i32,
    /// Set by `Worker::handle_cqe` once `result` has been written. The
    /// awaiting future's next `poll` sees this and returns `Ready`.
    pub done: bool,
    /// Set when the awaiting future was dropped before its operation
    /// completed. The kernel still holds this address and will write a
    /// completion into it eventually; an orphaned `TaskInfo` is freed by
    /// whichever worker reaps that completion instead of being woken.
    pub orphaned: bool,
}

impl TaskInfo {
    pub fn new() -> Self {
        Self {
            waker: None,
            result: 0,
            done: false,
            orphaned: false,
        }
    }
}

impl Default for TaskInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// The tag packed into the low 3 bits of every SQE/CQE `user_data` value.
/// The low 3 bits of a packed `user_data` value.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDataTag {
    /// Reserved: a bare `Nop` with no associated state (used by
    /// `detach()` to neutralize a still-in-flight SQE's completion).
    Nop = 0,
    /// Reserved: no tag at all: `user_data` is exactly 0 and carries no
    /// pointer. Only seen on completions the runtime deliberately
    /// ignores.
    None = 1,
    /// `user_data` (with the tag bits masked off) is a `*mut TaskInfo`
    /// for a single, unlinked operation.
    TaskInfoPtr = 2,
    /// `user_data` is a `*mut TaskInfo` that is the *head* of a chain of
    /// operations joined by the link combinator (`&`). Only the final
    /// entry in the chain carries `IOSQE_IO_LINK` unset.
    TaskInfoPtrLinked = 3,
    /// `user_data` is a `*mut TaskInfo` belonging to another worker's
    /// ready queue: this completion is a `msg_ring` delivery notice, not
    /// a real I/O result, and must re-increment that worker's
    /// `to_reap` counter rather than resolve a waker directly.
    MsgRingDelivery = 4,
    /// `user_data` is a boxed `Waker`, not a `TaskInfo`: on completion,
    /// wake it directly and discard `cqe.res`. For operations submitted
    /// purely to order a resumption against other SQEs on this same
    /// ring, where no caller ever reads a result and allocating a whole
    /// `TaskInfo` just to hold one would be wasted bookkeeping.
    RawCoroutineHandle = 5,
}

impl UserDataTag {
    const MASK: u64 = 0b111;

    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => UserDataTag::Nop,
            1 => UserDataTag::None,
            2 => UserDataTag::TaskInfoPtr,
            3 => UserDataTag::TaskInfoPtrLinked,
            4 => UserDataTag::MsgRingDelivery,
            5 => UserDataTag::RawCoroutineHandle,
            other => unreachable!("user_data tag bits out of range: {other}"),
        }
    }
}

/// Pack a `TaskInfo` pointer and a tag into a single `user_data` value.
///
/// # Panics
///
/// Panics if `ptr` is not 8-byte aligned (it always is, since `TaskInfo`
/// is `#[repr(align(8))]` and this only ever receives `Box::into_raw`
/// output), or if `tag` requires a non-null pointer but `ptr` is null.
pub fn encode_user_data(ptr: *mut TaskInfo, tag: UserDataTag) -> u64 {
    let addr = ptr as u64;
    assert_eq!(
        addr & UserDataTag::MASK,
        0,
        "TaskInfo pointer is not 8-byte aligned: {addr:#x}"
    );
    addr | (tag as u64)
}

/// Build the reserved `Nop` user_data value with no pointer, used to
/// neutralize a detached operation's completion.
pub fn nop_user_data() -> u64 {
    UserDataTag::Nop as u64
}

/// Box a `Waker` and return a `MsgRingDelivery`-tagged `user_data` value
/// suitable for `msg_ring`'s `data` argument: the opcode posts this value
/// unchanged as the target ring's completion `user_data`, which is how a
/// continuation crosses from one worker's ring to another's.
pub fn encode_waker_for_msg_ring(waker: std::task::Waker) -> u64 {
    let ptr = Box::into_raw(Box::new(waker));
    let addr = ptr as u64;
    assert_eq!(
        addr & UserDataTag::MASK,
        0,
        "boxed Waker pointer is not 8-byte aligned: {addr:#x}"
    );
    addr | (UserDataTag::MsgRingDelivery as u64)
}

/// Box `waker` and return a `RawCoroutineHandle`-tagged `user_data`
/// value: on completion the worker wakes it directly and discards the
/// CQE's result, with no `TaskInfo` involved at all.
pub fn encode_raw_coroutine_handle(waker: std::task::Waker) -> u64 {
    let ptr = Box::into_raw(Box::new(waker));
    let addr = ptr as u64;
    assert_eq!(
        addr & UserDataTag::MASK,
        0,
        "boxed Waker pointer is not 8-byte aligned: {addr:#x}"
    );
    addr | (UserDataTag::RawCoroutineHandle as u64)
}

/// Recover the boxed `Waker` a sender packed with
/// `encode_raw_coroutine_handle`.
///
/// # Safety
///
/// `user_data` must be a value `encode_raw_coroutine_handle` produced,
/// and this must be called at most once per value -- it takes ownership
/// of the box the sender allocated.
pub unsafe fn decode_raw_coroutine_handle(user_data: u64) -> std::task::Waker {
    let ptr = (user_data & !UserDataTag::MASK) as *mut std::task::Waker;
    *Box::from_raw(ptr)
}

/// Recover the boxed `Waker` a sender packed with `encode_waker_for_msg_ring`.
///
/// # Safety
///
/// `user_data` must be a value `encode_waker_for_msg_ring` produced, and
/// this must be called at most once per value -- it takes ownership of
/// the box the sender allocated.
pub unsafe fn decode_waker_from_msg_ring(user_data: u64) -> std::task::Waker {
    let ptr = (user_data & !UserDataTag::MASK) as *mut std::task::Waker;
    *Box::from_raw(ptr)
}

/// Unpack a `user_data` value into its tag and the `TaskInfo` pointer (if
/// the tag carries one).
///
/// Returns `None` for the pointer when the tag is `Nop`, `None`, or
/// `RawCoroutineHandle` (whose pointer is a boxed `Waker`, recovered
/// instead via `decode_raw_coroutine_handle`).
pub fn decode_user_data(user_data: u64) -> (UserDataTag, Option<*mut TaskInfo>) {
    let tag = UserDataTag::from_bits(user_data & UserDataTag::MASK);
    let ptr = match tag {
        UserDataTag::Nop | UserDataTag::None | UserDataTag::RawCoroutineHandle => None,
        UserDataTag::TaskInfoPtr | UserDataTag::TaskInfoPtrLinked | UserDataTag::MsgRingDelivery => {
            Some((user_data & !UserDataTag::MASK) as *mut TaskInfo)
        }
    };
    (tag, ptr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_pointer_and_tag() {
        let info = Box::into_raw(Box::new(TaskInfo::new()));
        for tag in [
            UserDataTag::TaskInfoPtr,
            UserDataTag::TaskInfoPtrLinked,
            UserDataTag::MsgRingDelivery,
        ] {
            let encoded = encode_user_data(info, tag);
            let (decoded_tag, decoded_ptr) = decode_user_data(encoded);
            assert_eq!(decoded_tag, tag);
            assert_eq!(decoded_ptr, Some(info));
        }
        unsafe { drop(Box::from_raw(info)) };
    }

    #[test]
    fn raw_coroutine_handle_round_trips_the_waker() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::task::Wake;

        struct CountingWaker(AtomicUsize);
        impl Wake for CountingWaker {
            fn wake(self: Arc<Self>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let encoded = encode_raw_coroutine_handle(waker);
        let (tag, ptr) = decode_user_data(encoded);
        assert_eq!(tag, UserDataTag::RawCoroutineHandle);
        assert_eq!(ptr, None);

        let decoded = unsafe { decode_raw_coroutine_handle(encoded) };
        decoded.wake();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nop_and_none_carry_no_pointer() {
        let (tag, ptr) = decode_user_data(nop_user_data());
        assert_eq!(tag, UserDataTag::Nop);
        assert_eq!(ptr, None);

        let (tag, ptr) = decode_user_data(UserDataTag::None as u64);
        assert_eq!(tag, UserDataTag::None);
        assert_eq!(ptr, None);
    }

    #[test]
    #[should_panic(expected = "not 8-byte aligned")]
    fn unaligned_pointer_panics() {
        let misaligned = 0x1001usize as *mut TaskInfo;
        encode_user_data(misaligned, UserDataTag::TaskInfoPtr);
    }

    #[test]
    fn default_task_info_has_no_waker_and_zero_result() {
        let info = TaskInfo::default();
        assert!(info.waker.is_none());
        assert_eq!(info.result, 0);
    }
}
