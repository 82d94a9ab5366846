//! # ring-task-core
//!
//! Platform-agnostic(-ish) building blocks shared by every other
//! `uring-task` crate: the SPSC cursor the ready queue is built from, the
//! `TaskInfo` record and its 64-bit tagged user-data encoding, the
//! compiled-in runtime constants, and the crate's error type.
//!
//! Nothing in this crate touches `io_uring` directly — that lives in
//! `ring-task-runtime` and `ring-task-io`. This crate only describes the
//! shapes those crates move around.
//!
//! ## Modules
//!
//! - `cursor` - the SPSC head/tail cursor and the ready queue built on it
//! - `task_info` - `TaskInfo` and the tagged user-data codec
//! - `config` - compiled-in constants, overridable via environment variables
//! - `error` - `RuntimeError`, the crate-wide error type
//! - `env` - generic environment-variable parsing helpers
//! - `kprint` - leveled, context-aware debug printing macros

pub mod config;
pub mod cursor;
pub mod env;
pub mod error;
pub mod kprint;
pub mod task_info;

pub use config::WorkerId;
pub use cursor::{ReadyQueue, SpscCursor};
pub use error::{Result, RuntimeError};
pub use task_info::{TaskInfo, UserDataTag};
