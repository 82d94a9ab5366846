//! # ring-task
//!
//! `Task<T>`, the runtime's lazy unit of work.
//!
//! `Task<T>` is a handle that does nothing until it is awaited: plain
//! `Future` already gives a boxed future the "nothing happens until
//! polled" property, so `Task<T>` exists at all (rather than callers
//! just passing around
//! `Pin<Box<dyn Future<Output = T> + Send>>` directly) to carry
//! `detach()`, which the bare `Future` trait has no room for.

mod spawn;
mod task;

pub use spawn::{clear_spawn_hook, set_spawn_hook, BoxedUnitFuture};
pub use task::{Task, WhenReady};
