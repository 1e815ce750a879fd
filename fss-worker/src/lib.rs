//! # fss-worker
//!
//! The worker side of a synchronization task: the copy / delete / full-sync
//! executor and the text report it hands back to the manager.
//!
//! A worker receives four positional values (source, target, file-or-`ALL`,
//! operation tag) and answers with a report block on its output stream; see
//! [`report`] for the framing. [`execute_args`] is the entry point used by the
//! `fss-worker` binary and by the manager's in-process launcher.

pub mod error;
pub mod executor;
pub mod report;

pub use error::WorkerError;
pub use executor::{execute, execute_args, FullSyncCounts, TMP_SUFFIX};
pub use report::{WorkerReport, REPORT_END, REPORT_START};
