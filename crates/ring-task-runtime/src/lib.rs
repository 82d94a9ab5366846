//! # ring-task-runtime
//!
//! The per-thread `io_uring` event loop (`worker`) and the process-wide
//! registry that lets one worker hand a task to another (`registry`).
//!
//! Everything in `ring-task-io` and `ring-task` is wired to whichever
//! worker owns the current thread through thread-local hooks those
//! crates declare and this crate installs -- see `tls`.

mod tls;

pub mod registry;
pub mod worker;

pub use registry::{registry, Registry};
pub use tls::current_worker_id;
pub use worker::{spawn_on, Worker};
