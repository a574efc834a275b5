use std::error::Error as StdError;
use std::fmt;
use std::io;

use serde_json;
use serde_yaml;
use tokio_timer::TimerError;

use dns::Question;

/// The crate-wide error type.
///
/// Variants map directly onto the error taxonomy of the runtime: most are
/// surfaced straight to the caller, `RetrySchedulingException` is delivered
/// only to a task's own exception handler (see `retry::scheduler`).
#[derive(Debug)]
pub enum Error {
    /// Bad endpoint literal, forbidden header, negative port/timeout/weight,
    /// a required option left unset.
    InvalidArgument(String),

    /// An API was called in the wrong state: scheduler invoked off its
    /// event loop, `try_schedule` while already armed (strict variant),
    /// `with_ip_addr(None)` on an IP-literal endpoint, and so on.
    IllegalState(String),

    /// NXDOMAIN, or a hit against the resolver's negative cache.
    UnknownHost(String),

    /// No upstream DNS server answered within `query_timeout_ms`.
    DnsTimeout(Vec<Question>),

    /// A connection- or request-level response deadline elapsed.
    ResponseTimeout,

    /// The owning event loop was terminated while work was queued.
    RejectedExecution(String),

    /// Scheduler-internal notification delivered to a task's own handler,
    /// never to the caller of `try_schedule`.
    RetrySchedulingException(RetryCause),

    /// The subsystem was closed while the operation was still pending.
    Cancelled,

    /// Wraps an underlying I/O failure (socket, UDP, timer).
    Io(io::Error),
}

/// Why a retry task's handler was invoked instead of the task itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    /// A strictly-earlier task overtook this one before it ran.
    RetryTaskOvertaken,
    /// The scheduler was closed while this task was still armed.
    RetryTaskCancelled,
    /// The task's future had already completed when overtaken/cancelled.
    RetryingAlreadyCompleted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidArgument(ref m) => write!(f, "invalid argument: {}", m),
            Error::IllegalState(ref m) => write!(f, "illegal state: {}", m),
            Error::UnknownHost(ref h) => write!(f, "unknown host: {}", h),
            Error::DnsTimeout(ref qs) => write!(f, "dns timeout after querying {} name(s)", qs.len()),
            Error::ResponseTimeout => write!(f, "response timeout"),
            Error::RejectedExecution(ref m) => write!(f, "rejected execution: {}", m),
            Error::RetrySchedulingException(c) => write!(f, "retry scheduling exception: {:?}", c),
            Error::Cancelled => write!(f, "cancelled"),
            Error::Io(ref e) => write!(f, "io error: {}", e),
        }
    }
}

impl StdError for Error {
    fn description(&self) -> &str {
        match *self {
            Error::InvalidArgument(_) => "invalid argument",
            Error::IllegalState(_) => "illegal state",
            Error::UnknownHost(_) => "unknown host",
            Error::DnsTimeout(_) => "dns timeout",
            Error::ResponseTimeout => "response timeout",
            Error::RejectedExecution(_) => "rejected execution",
            Error::RetrySchedulingException(_) => "retry scheduling exception",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io error",
        }
    }

    fn cause(&self) -> Option<&StdError> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<TimerError> for Error {
    fn from(e: TimerError) -> Error {
        Error::Io(io::Error::new(io::ErrorKind::Other, format!("{}", e)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Error {
        Error::InvalidArgument(format!("config: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::InvalidArgument(format!("config: {}", e))
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
