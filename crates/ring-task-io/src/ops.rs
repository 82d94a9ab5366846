//! I/O awaitables: one `Future<Output = i32>` per `io_uring` opcode the
//! runtime exposes, plus the shared polling/submission machinery they're
//! all built on.
//!
//! A generic `IoFuture<D>` holds the shared poll/submit state machine,
//! parameterized over a small `IoOpDesc` implementor per opcode that only
//! knows how to build its own SQE.
//!
//! Every awaitable here resolves to the kernel's raw `res` value (an
//! `i32`, negative on error) rather than a `Result`: that's what
//! `io_uring_cqe::res` is, and wrapping it in a `Result<u32, Errno>`
//! before the caller has a chance to inspect `-EAGAIN`/`-ETIME`/partial
//! reads would throw away information the original exposes directly.
//! Use `ring_task_core::error::is_timeout` to test for a `Timeout` op's
//! deadline elapsing.

use io_uring::{opcode, squeue, types};
use ring_task_core::task_info::{encode_user_data, nop_user_data, TaskInfo, UserDataTag};
use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::reactor::submit;

/// Something that knows how to build exactly one `io_uring` SQE. Each
/// opcode in this module implements it once.
pub trait IoOpDesc {
    fn build_sqe(&self) -> squeue::Entry;
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum State {
    Unsubmitted,
    Submitted,
    Done,
}

/// The generic I/O awaitable: submits its descriptor's SQE on first
/// poll, then waits to be woken by `Worker::handle_cqe` once the
/// completion arrives.
pub struct IoFuture<D> {
    desc: D,
    info: *mut TaskInfo,
    state: State,
    async_flag: bool,
}

// Safety: `desc` only contains plain integers and raw pointers supplied
// by the caller, who is responsible for keeping any pointee alive across
// the await point -- no different a contract than passing a buffer to
// `read(2)`. `info` is only ever dereferenced on the thread that owns
// the worker ring the operation was submitted to.
unsafe impl<D> Send for IoFuture<D> {}

impl<D: IoOpDesc> IoFuture<D> {
    pub fn new(desc: D) -> Self {
        Self {
            desc,
            info: Box::into_raw(Box::new(TaskInfo::new())),
            state: State::Unsubmitted,
            async_flag: false,
        }
    }

    /// Set `IOSQE_ASYNC` on the submitted SQE, forcing it onto an
    /// io-wq worker instead of trying non-blocking completion inline.
    /// Mirrors `lazy_awaiter::set_async()`.
    pub fn set_async(mut self) -> Self {
        self.async_flag = true;
        self
    }
}

impl<D: IoOpDesc + 'static> IoFuture<D> {
    /// Tear an unsubmitted awaitable down into the raw pieces the link
    /// combinator (`crate::link`) assembles into a `Linked` chain: the
    /// type-erased op descriptor, the `TaskInfo` address it will tag its
    /// SQE with, and whether `set_async()` was requested.
    ///
    /// # Panics
    ///
    /// Panics if the awaitable has already been submitted or polled to
    /// completion -- only a never-polled awaitable's SQE hasn't been
    /// handed to the kernel yet, which is the only state the link
    /// combinator can still fuse into a chain.
    pub(crate) fn into_link_parts(self) -> (Box<dyn IoOpDesc>, *mut TaskInfo, bool) {
        assert!(
            self.state == State::Unsubmitted,
            "link combinator (`&`) requires an unsubmitted awaitable on both sides"
        );
        let mut this = std::mem::ManuallyDrop::new(self);
        // Safety: `this` is never dropped (it's `ManuallyDrop`), so
        // `desc` is read out exactly once and never touched again
        // through `this`.
        let desc = unsafe { std::ptr::read(&mut this.desc) };
        (Box::new(desc), this.info, this.async_flag)
    }
}

impl<D: IoOpDesc> Future for IoFuture<D> {
    type Output = i32;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
        let this = self.get_mut();
        match this.state {
            State::Unsubmitted => {
                unsafe {
                    (*this.info).waker = Some(cx.waker().clone());
                }
                let user_data = encode_user_data(this.info, UserDataTag::TaskInfoPtr);
                let mut entry = this.desc.build_sqe().user_data(user_data);
                if this.async_flag {
                    entry = entry.flags(squeue::Flags::ASYNC);
                }
                submit(entry).expect("submission ring exhausted");
                this.state = State::Submitted;
                Poll::Pending
            }
            State::Submitted => {
                let done = unsafe { (*this.info).done };
                if done {
                    let result = unsafe { (*this.info).result };
                    this.state = State::Done;
                    Poll::Ready(result)
                } else {
                    unsafe {
                        (*this.info).waker = Some(cx.waker().clone());
                    }
                    Poll::Pending
                }
            }
            State::Done => panic!("IoFuture polled again after it already resolved"),
        }
    }
}

impl<D> Drop for IoFuture<D> {
    fn drop(&mut self) {
        match self.state {
            State::Submitted => {
                // The kernel still owns this address and will complete
                // into it later. `Worker::handle_cqe` frees it once that
                // arrives instead of waking a waker nobody holds anymore.
                unsafe {
                    (*self.info).orphaned = true;
                }
            }
            State::Unsubmitted | State::Done => unsafe {
                drop(Box::from_raw(self.info));
            },
        }
    }
}

/// Detach an in-flight awaitable from its caller: the operation keeps
/// running to completion in the kernel, but nothing observes its
/// result. Rewrites `user_data` is not possible once an SQE is
/// submitted, so this works the same way dropping does -- mark the
/// `TaskInfo` orphaned and let the reaping worker reclaim it.
pub fn detach<D: IoOpDesc>(future: IoFuture<D>) {
    drop(future);
}

macro_rules! simple_desc {
    ($desc:ident, $fut:ident { $($field:ident : $ty:ty),* $(,)? }, |$self:ident| $build:expr) => {
        struct $desc {
            $($field: $ty,)*
        }

        impl IoOpDesc for $desc {
            fn build_sqe(&$self) -> squeue::Entry {
                $build
            }
        }

        pub type $fut = IoFuture<$desc>;
    };
}

simple_desc!(ReadDesc, Read { fd: RawFd, buf: *mut u8, len: u32, offset: u64 }, |self| {
    opcode::Read::new(types::Fd(self.fd), self.buf, self.len)
        .offset(self.offset)
        .build()
});

impl Read {
    pub fn new(fd: RawFd, buf: &mut [u8], offset: u64) -> Self {
        IoFuture::new(ReadDesc {
            fd,
            buf: buf.as_mut_ptr(),
            len: buf.len() as u32,
            offset,
        })
    }
}

simple_desc!(WriteDesc, Write { fd: RawFd, buf: *const u8, len: u32, offset: u64 }, |self| {
    opcode::Write::new(types::Fd(self.fd), self.buf, self.len)
        .offset(self.offset)
        .build()
});

impl Write {
    pub fn new(fd: RawFd, buf: &[u8], offset: u64) -> Self {
        IoFuture::new(WriteDesc {
            fd,
            buf: buf.as_ptr(),
            len: buf.len() as u32,
            offset,
        })
    }
}

simple_desc!(ReadvDesc, Readv { fd: RawFd, iov: *const libc::iovec, iovcnt: u32, offset: u64 }, |self| {
    opcode::Readv::new(types::Fd(self.fd), self.iov, self.iovcnt)
        .offset(self.offset)
        .build()
});

impl Readv {
    pub fn new(fd: RawFd, iov: &[libc::iovec], offset: u64) -> Self {
        IoFuture::new(ReadvDesc {
            fd,
            iov: iov.as_ptr(),
            iovcnt: iov.len() as u32,
            offset,
        })
    }
}

simple_desc!(WritevDesc, Writev { fd: RawFd, iov: *const libc::iovec, iovcnt: u32, offset: u64 }, |self| {
    opcode::Writev::new(types::Fd(self.fd), self.iov, self.iovcnt)
        .offset(self.offset)
        .build()
});

impl Writev {
    pub fn new(fd: RawFd, iov: &[libc::iovec], offset: u64) -> Self {
        IoFuture::new(WritevDesc {
            fd,
            iov: iov.as_ptr(),
            iovcnt: iov.len() as u32,
            offset,
        })
    }
}

simple_desc!(ReadFixedDesc, ReadFixed { fd: RawFd, buf: *mut u8, len: u32, offset: u64, index: u16 }, |self| {
    opcode::ReadFixed::new(types::Fd(self.fd), self.buf, self.len, self.index)
        .offset(self.offset)
        .build()
});

impl ReadFixed {
    pub fn new(fd: RawFd, buf: &mut [u8], offset: u64, index: u16) -> Self {
        IoFuture::new(ReadFixedDesc {
            fd,
            buf: buf.as_mut_ptr(),
            len: buf.len() as u32,
            offset,
            index,
        })
    }
}

simple_desc!(WriteFixedDesc, WriteFixed { fd: RawFd, buf: *const u8, len: u32, offset: u64, index: u16 }, |self| {
    opcode::WriteFixed::new(types::Fd(self.fd), self.buf, self.len, self.index)
        .offset(self.offset)
        .build()
});

impl WriteFixed {
    pub fn new(fd: RawFd, buf: &[u8], offset: u64, index: u16) -> Self {
        IoFuture::new(WriteFixedDesc {
            fd,
            buf: buf.as_ptr(),
            len: buf.len() as u32,
            offset,
            index,
        })
    }
}

simple_desc!(RecvDesc, Recv { fd: RawFd, buf: *mut u8, len: u32, flags: i32 }, |self| {
    opcode::Recv::new(types::Fd(self.fd), self.buf, self.len)
        .flags(self.flags)
        .build()
});

impl Recv {
    pub fn new(fd: RawFd, buf: &mut [u8], flags: i32) -> Self {
        IoFuture::new(RecvDesc {
            fd,
            buf: buf.as_mut_ptr(),
            len: buf.len() as u32,
            flags,
        })
    }
}

simple_desc!(SendDesc, Send { fd: RawFd, buf: *const u8, len: u32, flags: i32 }, |self| {
    opcode::Send::new(types::Fd(self.fd), self.buf, self.len)
        .flags(self.flags)
        .build()
});

impl Send {
    pub fn new(fd: RawFd, buf: &[u8], flags: i32) -> Self {
        IoFuture::new(SendDesc {
            fd,
            buf: buf.as_ptr(),
            len: buf.len() as u32,
            flags,
        })
    }
}

simple_desc!(RecvMsgDesc, RecvMsg { fd: RawFd, msg: *mut libc::msghdr, flags: u32 }, |self| {
    opcode::RecvMsg::new(types::Fd(self.fd), self.msg)
        .flags(self.flags)
        .build()
});

impl RecvMsg {
    pub fn new(fd: RawFd, msg: *mut libc::msghdr, flags: u32) -> Self {
        IoFuture::new(RecvMsgDesc { fd, msg, flags })
    }
}

simple_desc!(SendMsgDesc, SendMsg { fd: RawFd, msg: *const libc::msghdr, flags: u32 }, |self| {
    opcode::SendMsg::new(types::Fd(self.fd), self.msg)
        .flags(self.flags)
        .build()
});

impl SendMsg {
    pub fn new(fd: RawFd, msg: *const libc::msghdr, flags: u32) -> Self {
        IoFuture::new(SendMsgDesc { fd, msg, flags })
    }
}

simple_desc!(AcceptDesc, Accept { fd: RawFd, addr: *mut libc::sockaddr, addrlen: *mut libc::socklen_t, flags: i32 }, |self| {
    opcode::Accept::new(types::Fd(self.fd), self.addr, self.addrlen)
        .flags(self.flags)
        .build()
});

impl Accept {
    pub fn new(fd: RawFd, addr: *mut libc::sockaddr, addrlen: *mut libc::socklen_t, flags: i32) -> Self {
        IoFuture::new(AcceptDesc { fd, addr, addrlen, flags })
    }
}

simple_desc!(ConnectDesc, Connect { fd: RawFd, addr: *const libc::sockaddr, addrlen: u32 }, |self| {
    opcode::Connect::new(types::Fd(self.fd), self.addr, self.addrlen).build()
});

impl Connect {
    pub fn new(fd: RawFd, addr: *const libc::sockaddr, addrlen: u32) -> Self {
        IoFuture::new(ConnectDesc { fd, addr, addrlen })
    }
}

simple_desc!(ShutdownDesc, Shutdown { fd: RawFd, how: i32 }, |self| {
    opcode::Shutdown::new(types::Fd(self.fd), self.how).build()
});

impl Shutdown {
    pub fn new(fd: RawFd, how: i32) -> Self {
        IoFuture::new(ShutdownDesc { fd, how })
    }
}

simple_desc!(CloseDesc, Close { fd: RawFd }, |self| {
    opcode::Close::new(types::Fd(self.fd)).build()
});

impl Close {
    pub fn new(fd: RawFd) -> Self {
        IoFuture::new(CloseDesc { fd })
    }
}

simple_desc!(OpenAtDesc, OpenAt { dirfd: RawFd, path: *const libc::c_char, flags: i32, mode: u32 }, |self| {
    opcode::OpenAt::new(types::Fd(self.dirfd), self.path)
        .flags(self.flags)
        .mode(self.mode)
        .build()
});

impl OpenAt {
    pub fn new(dirfd: RawFd, path: *const libc::c_char, flags: i32, mode: u32) -> Self {
        IoFuture::new(OpenAtDesc { dirfd, path, flags, mode })
    }
}

simple_desc!(SpliceDesc, Splice {
    fd_in: RawFd, off_in: i64, fd_out: RawFd, off_out: i64, len: u32, flags: u32
}, |self| {
    opcode::Splice::new(types::Fd(self.fd_in), self.off_in, types::Fd(self.fd_out), self.off_out, self.len)
        .flags(self.flags)
        .build()
});

impl Splice {
    pub fn new(fd_in: RawFd, off_in: i64, fd_out: RawFd, off_out: i64, len: u32, flags: u32) -> Self {
        IoFuture::new(SpliceDesc { fd_in, off_in, fd_out, off_out, len, flags })
    }
}

simple_desc!(TeeDesc, Tee { fd_in: RawFd, fd_out: RawFd, len: u32, flags: u32 }, |self| {
    opcode::Tee::new(types::Fd(self.fd_in), types::Fd(self.fd_out), self.len)
        .flags(self.flags)
        .build()
});

impl Tee {
    pub fn new(fd_in: RawFd, fd_out: RawFd, len: u32, flags: u32) -> Self {
        IoFuture::new(TeeDesc { fd_in, fd_out, len, flags })
    }
}

// Written out by hand rather than via `simple_desc!`: `Timeout` needs
// its `Timespec` kept alive at a stable address for the duration of the
// operation, since the kernel reads `*ts` asynchronously.
struct TimeoutDescOwned {
    ts: Box<types::Timespec>,
}

impl IoOpDesc for TimeoutDescOwned {
    fn build_sqe(&self) -> squeue::Entry {
        opcode::Timeout::new(self.ts.as_ref()).build()
    }
}

pub type Timeout = IoFuture<TimeoutDescOwned>;

impl Timeout {
    /// `nanos` is biased by `ring_task_core::config::TIMEOUT_BIAS_NS`
    /// before being submitted, compensating for the latency of the
    /// worker noticing the completion.
    pub fn new(secs: u64, nanos: u32) -> Self {
        let bias = ring_task_core::config::runtime_config().timeout_bias_ns;
        let biased_nanos = (nanos as i64 + bias).max(0) as u32;
        let ts = Box::new(types::Timespec::new().sec(secs).nsec(biased_nanos));
        IoFuture::new(TimeoutDescOwned { ts })
    }
}

simple_desc!(NopDesc, Nop {}, |self| { opcode::Nop::new().build() });

impl Nop {
    pub fn new() -> Self {
        IoFuture::new(NopDesc {})
    }
}

impl Default for Nop {
    fn default() -> Self {
        Self::new()
    }
}

simple_desc!(PollAddDesc, PollAdd { fd: RawFd, flags: u32 }, |self| {
    opcode::PollAdd::new(types::Fd(self.fd), self.flags).build()
});

impl PollAdd {
    pub fn new(fd: RawFd, flags: u32) -> Self {
        IoFuture::new(PollAddDesc { fd, flags })
    }
}

simple_desc!(FsyncDesc, Fsync { fd: RawFd, datasync: bool }, |self| {
    let mut builder = opcode::Fsync::new(types::Fd(self.fd));
    if self.datasync {
        builder = builder.flags(types::FsyncFlags::DATASYNC);
    }
    builder.build()
});

impl Fsync {
    pub fn new(fd: RawFd, datasync: bool) -> Self {
        IoFuture::new(FsyncDesc { fd, datasync })
    }
}

simple_desc!(StatxDesc, Statx {
    dirfd: RawFd, path: *const libc::c_char, flags: i32, mask: u32, statxbuf: *mut types::statx
}, |self| {
    opcode::Statx::new(types::Fd(self.dirfd), self.path, self.statxbuf)
        .flags(self.flags)
        .mask(self.mask)
        .build()
});

impl Statx {
    pub fn new(
        dirfd: RawFd,
        path: *const libc::c_char,
        flags: i32,
        mask: u32,
        statxbuf: *mut types::statx,
    ) -> Self {
        IoFuture::new(StatxDesc { dirfd, path, flags, mask, statxbuf })
    }
}

simple_desc!(RenameAtDesc, RenameAt {
    olddirfd: RawFd, oldpath: *const libc::c_char, newdirfd: RawFd, newpath: *const libc::c_char, flags: u32
}, |self| {
    opcode::RenameAt::new(types::Fd(self.olddirfd), self.oldpath, types::Fd(self.newdirfd), self.newpath)
        .flags(self.flags)
        .build()
});

impl RenameAt {
    pub fn new(
        olddirfd: RawFd,
        oldpath: *const libc::c_char,
        newdirfd: RawFd,
        newpath: *const libc::c_char,
        flags: u32,
    ) -> Self {
        IoFuture::new(RenameAtDesc { olddirfd, oldpath, newdirfd, newpath, flags })
    }
}

simple_desc!(MkDirAtDesc, MkDirAt { dirfd: RawFd, path: *const libc::c_char, mode: u32 }, |self| {
    opcode::MkDirAt::new(types::Fd(self.dirfd), self.path)
        .mode(self.mode)
        .build()
});

impl MkDirAt {
    pub fn new(dirfd: RawFd, path: *const libc::c_char, mode: u32) -> Self {
        IoFuture::new(MkDirAtDesc { dirfd, path, mode })
    }
}

simple_desc!(LinkAtDesc, LinkAt {
    olddirfd: RawFd, oldpath: *const libc::c_char, newdirfd: RawFd, newpath: *const libc::c_char, flags: i32
}, |self| {
    opcode::LinkAt::new(types::Fd(self.olddirfd), self.oldpath, types::Fd(self.newdirfd), self.newpath)
        .flags(self.flags)
        .build()
});

impl LinkAt {
    pub fn new(
        olddirfd: RawFd,
        oldpath: *const libc::c_char,
        newdirfd: RawFd,
        newpath: *const libc::c_char,
        flags: i32,
    ) -> Self {
        IoFuture::new(LinkAtDesc { olddirfd, oldpath, newdirfd, newpath, flags })
    }
}

simple_desc!(UnlinkAtDesc, UnlinkAt { dirfd: RawFd, path: *const libc::c_char, flags: i32 }, |self| {
    opcode::UnlinkAt::new(types::Fd(self.dirfd), self.path)
        .flags(self.flags)
        .build()
});

impl UnlinkAt {
    pub fn new(dirfd: RawFd, path: *const libc::c_char, flags: i32) -> Self {
        IoFuture::new(UnlinkAtDesc { dirfd, path, flags })
    }
}

simple_desc!(SymlinkAtDesc, SymlinkAt { target: *const libc::c_char, newdirfd: RawFd, linkpath: *const libc::c_char }, |self| {
    opcode::SymlinkAt::new(types::Fd(self.newdirfd), self.target, self.linkpath).build()
});

impl SymlinkAt {
    pub fn new(target: *const libc::c_char, newdirfd: RawFd, linkpath: *const libc::c_char) -> Self {
        IoFuture::new(SymlinkAtDesc { target, newdirfd, linkpath })
    }
}

/// Neutralize an already-submitted operation's completion so it is
/// silently discarded instead of waking a caller that went away.
/// Mirrors `lazy_awaiter::detach()`: since an in-flight SQE can't be
/// rewritten, this only has an effect on unsubmitted futures (for a
/// submitted one, dropping does the equivalent job -- see `IoFuture`'s
/// `Drop` impl).
pub fn nop_tag_for_detached() -> u64 {
    nop_user_data()
}

/// Yield the current task, resuming it only once every SQE already
/// queued ahead of it on this ring has had a chance to complete.
/// Mirrors `scheduler::yield_now()`'s voluntary reschedule, but ordered
/// by the ring rather than by re-enqueuing onto a scheduler's run queue.
///
/// Submits a bare `Nop` tagged with a boxed `Waker` instead of a
/// `TaskInfo` pointer -- nothing ever reads this operation's result, so
/// there's no completion value worth a full `TaskInfo` allocation for.
pub struct Yield {
    submitted: bool,
}

impl Yield {
    pub fn new() -> Self {
        Self { submitted: false }
    }
}

impl Default for Yield {
    fn default() -> Self {
        Self::new()
    }
}

impl Future for Yield {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.submitted {
            return Poll::Ready(());
        }
        let user_data = ring_task_core::task_info::encode_raw_coroutine_handle(cx.waker().clone());
        let entry = opcode::Nop::new().build().user_data(user_data);
        submit(entry).expect("submission ring exhausted");
        this.submitted = true;
        Poll::Pending
    }
}
