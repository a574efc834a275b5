//! Single-threaded retry scheduling: at most one pending retry task per
//! scheduler, bound to the deadline of the request it belongs to.

pub mod scheduler;

pub use self::scheduler::{RetryScheduler, RetryTask, WhenClosed};
