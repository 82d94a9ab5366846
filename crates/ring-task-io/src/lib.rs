//! # ring-task-io
//!
//! `io_uring`-backed I/O awaitables (`ops`), the thread-local submission
//! hook that wires them to whichever worker owns the current thread
//! (`reactor`), and the link combinator that fuses several awaitables
//! into one kernel-ordered chain (`link`).
//!
//! Nothing here owns a ring, a ready queue, or a thread -- that's
//! `ring-task-runtime::Worker`. This crate only knows how to turn
//! operation parameters into an SQE and suspend until its matching CQE
//! arrives.

pub mod link;
pub mod ops;
pub mod reactor;

pub use link::Linked;
pub use ops::{
    Accept, Close, Connect, Fsync, IoFuture, IoOpDesc, LinkAt, MkDirAt, Nop, OpenAt, PollAdd,
    Read, ReadFixed, Readv, Recv, RecvMsg, RenameAt, Send, SendMsg, Shutdown, Splice, Statx,
    SymlinkAt, Tee, Timeout, UnlinkAt, Write, WriteFixed, Writev, Yield,
};
pub use reactor::{clear_submit_hook, set_submit_hook, SubmitFn};
