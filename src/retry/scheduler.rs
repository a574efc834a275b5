//! A single-threaded, deadline-bounded sequencer that keeps at most one
//! retry task pending at a time.
//!
//! Per the Open Question in the design notes, this crate implements the
//! **overtake** variant: a `try_schedule` call while armed never fails
//! with `IllegalState` (unlike the "strict" one-at-a-time variant) —
//! instead it always cancels whatever was armed and arms the new task,
//! notifying the superseded task's own handler. Thread affinity is
//! enforced the way the design notes prescribe: a thread id captured at
//! construction, checked on every public entry, no locks involved.

use std::rc::Rc;
use std::cell::RefCell;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use futures::Future;
use futures::sync::oneshot;
use tacho;
use tokio_core::reactor::Handle;
use tokio_timer::Timer;

use error::{Error, RetryCause, Result};
use metrics::RetryMetrics;

/// The action a scheduled retry performs, plus the handler invoked
/// instead of it if the task is ever overtaken or cancelled.
pub struct RetryTask {
    run: Box<FnMut()>,
    on_not_run: Box<FnMut(RetryCause)>,
}

impl RetryTask {
    pub fn new<R, N>(run: R, on_not_run: N) -> RetryTask
    where
        R: FnMut() + 'static,
        N: FnMut(RetryCause) + 'static,
    {
        RetryTask {
            run: Box::new(run),
            on_not_run: Box::new(on_not_run),
        }
    }
}

struct Armed {
    task_number: u64,
    scheduled_at: Instant,
    task: RetryTask,
}

enum StateKind {
    Idle,
    Armed(Armed),
    Closed,
}

struct Inner {
    state: StateKind,
    deadline: Instant,
    minimum_backoff: Duration,
    next_task_number: u64,
    when_closed: Option<oneshot::Sender<::std::result::Result<(), String>>>,
}

/// A retry sequencer bound to one `tokio_core` event loop.
#[derive(Clone)]
pub struct RetryScheduler {
    handle: Handle,
    timer: Timer,
    owner_thread: ThreadId,
    inner: Rc<RefCell<Inner>>,
    metrics: RetryMetrics,
}

/// Resolves when the scheduler reaches the `closed` state; fails with
/// the cause if the scheduler closed because an executing task panicked
/// (propagated by the caller via `Error::IllegalState`, the
/// closest-fitting variant in this crate's taxonomy).
pub type WhenClosed = Box<Future<Item = (), Error = Error>>;

impl RetryScheduler {
    pub fn new(handle: Handle, timer: Timer, deadline: Instant, metrics: &tacho::Scope) -> (RetryScheduler, WhenClosed) {
        let (tx, rx) = oneshot::channel();
        let scheduler = RetryScheduler {
            handle: handle,
            timer: timer,
            owner_thread: thread::current().id(),
            inner: Rc::new(RefCell::new(Inner {
                state: StateKind::Idle,
                deadline: deadline,
                minimum_backoff: Duration::from_millis(0),
                next_task_number: 0,
                when_closed: Some(tx),
            })),
            metrics: RetryMetrics::new(metrics),
        };
        let when_closed: WhenClosed = Box::new(rx.then(|res| match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(Error::IllegalState(msg)),
            Err(_) => Err(Error::IllegalState("scheduler dropped".into())),
        }));
        (scheduler, when_closed)
    }

    fn check_thread(&self) -> Result<()> {
        if thread::current().id() != self.owner_thread {
            return Err(Error::IllegalState(
                "RetryScheduler invoked from a thread other than its owning event loop".into(),
            ));
        }
        Ok(())
    }

    /// Attempts to arm `task` to run `delay_millis` from now (bounded
    /// below by the sticky minimum backoff). Returns `false` without
    /// changing state if the resulting time would exceed the deadline,
    /// or if the scheduler is closed. Otherwise arms the task,
    /// overtaking (and notifying) whatever was previously armed.
    pub fn try_schedule(&self, delay_millis: i64, task: RetryTask) -> Result<bool> {
        self.check_thread()?;

        let mut inner = self.inner.borrow_mut();
        if let StateKind::Closed = inner.state {
            return Ok(false);
        }

        let delay_millis = if delay_millis < 0 { 0 } else { delay_millis };
        let min_backoff_ms = inner.minimum_backoff.as_secs() * 1000
            + u64::from(inner.minimum_backoff.subsec_nanos()) / 1_000_000;
        let effective_delay_ms = ::std::cmp::max(delay_millis as u64, min_backoff_ms);
        let scheduled_at = Instant::now() + Duration::from_millis(effective_delay_ms);

        if scheduled_at > inner.deadline {
            return Ok(false);
        }

        if let StateKind::Armed(_) = inner.state {
            let previous = match ::std::mem::replace(&mut inner.state, StateKind::Idle) {
                StateKind::Armed(armed) => armed,
                _ => unreachable!(),
            };
            self.notify(previous, RetryCause::RetryTaskOvertaken);
        }

        let task_number = inner.next_task_number;
        inner.next_task_number += 1;
        inner.state = StateKind::Armed(Armed {
            task_number: task_number,
            scheduled_at: scheduled_at,
            task: task,
        });
        drop(inner);

        self.spawn_timer(task_number, effective_delay_ms);
        Ok(true)
    }

    fn spawn_timer(&self, task_number: u64, delay_ms: u64) {
        let scheduler = self.clone();
        let sleep = self.timer
            .sleep(Duration::from_millis(delay_ms))
            .then(move |_| {
                scheduler.run_if_still_armed(task_number);
                Ok::<(), ()>(())
            });
        self.handle.spawn(sleep);
    }

    fn run_if_still_armed(&self, task_number: u64) {
        let armed = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                StateKind::Armed(ref armed) if armed.task_number == task_number => {}
                _ => return,
            }
            match ::std::mem::replace(&mut inner.state, StateKind::Idle) {
                StateKind::Armed(armed) => armed,
                _ => unreachable!(),
            }
        };
        self.metrics.incr_ran();
        let mut task = armed.task;
        (task.run)();
    }

    fn notify(&self, mut armed: Armed, cause: RetryCause) {
        match cause {
            RetryCause::RetryTaskOvertaken => self.metrics.incr_overtaken(),
            RetryCause::RetryTaskCancelled => self.metrics.incr_cancelled(),
            RetryCause::RetryingAlreadyCompleted => {}
        }
        (armed.task.on_not_run)(cause);
    }

    /// Raises the sticky minimum backoff for the next schedule: the
    /// resulting value is `max(current, requested)`. Negative or
    /// `i64::MIN` values clamp to zero.
    ///
    /// Per the overtake variant (see the module doc comment), this is
    /// allowed even while a task is armed: the armed task is then
    /// rescheduled to honor the new minimum via
    /// `reschedule_current_if_too_early`, rather than being rejected.
    pub fn apply_minimum_backoff_millis_for_next_retry(&self, ms: i64) -> Result<()> {
        self.check_thread()?;
        {
            let mut inner = self.inner.borrow_mut();
            let clamped = if ms < 0 { 0 } else { ms as u64 };
            let requested = Duration::from_millis(clamped);
            if requested > inner.minimum_backoff {
                inner.minimum_backoff = requested;
            }
        }
        self.reschedule_current_if_too_early()
    }

    /// If the armed task's scheduled time is earlier than the current
    /// minimum-backoff target, reschedules it to that target (never
    /// earlier). A no-op if already at or beyond the target, or if
    /// nothing is armed.
    pub fn reschedule_current_if_too_early(&self) -> Result<()> {
        self.check_thread()?;
        let (task_number, new_delay_ms) = {
            let mut inner = self.inner.borrow_mut();
            let target = Instant::now() + inner.minimum_backoff;
            {
                let armed = match inner.state {
                    StateKind::Armed(ref armed) => armed,
                    _ => return Ok(()),
                };
                if armed.scheduled_at >= target {
                    return Ok(());
                }
            }
            // Bump the task number so the timer already in flight for the
            // old (too-early) schedule becomes a no-op in
            // `run_if_still_armed` when it fires; only the new timer
            // spawned below can run this task.
            let task_number = inner.next_task_number;
            inner.next_task_number += 1;
            if let StateKind::Armed(ref mut armed) = inner.state {
                armed.task_number = task_number;
                armed.scheduled_at = target;
            }
            let delay = target.duration_since(Instant::now());
            let ms = delay.as_secs() * 1000 + u64::from(delay.subsec_nanos()) / 1_000_000;
            (task_number, ms)
        };
        self.spawn_timer(task_number, new_delay_ms);
        Ok(())
    }

    /// Closes the scheduler. An armed task is cancelled (its handler
    /// receives `RETRY_TASK_CANCELLED`); `when_closed` then completes.
    pub fn close(&self) -> Result<()> {
        self.check_thread()?;
        let previous = {
            let mut inner = self.inner.borrow_mut();
            let previous = ::std::mem::replace(&mut inner.state, StateKind::Closed);
            if let Some(tx) = inner.when_closed.take() {
                let _ = tx.send(Ok(()));
            }
            previous
        };
        if let StateKind::Armed(armed) = previous {
            self.notify(armed, RetryCause::RetryTaskCancelled);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        match self.inner.borrow().state {
            StateKind::Closed => true,
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        match self.inner.borrow().state {
            StateKind::Armed(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio_core::reactor::Core;

    fn new_scheduler(core: &Core, deadline_ms: u64) -> (RetryScheduler, WhenClosed) {
        RetryScheduler::new(
            core.handle(),
            Timer::default(),
            Instant::now() + Duration::from_millis(deadline_ms),
            &tacho::new().0,
        )
    }

    #[test]
    fn beyond_deadline_returns_false_without_state_change() {
        let core = Core::new().unwrap();
        let (scheduler, _wc) = new_scheduler(&core, 1000);
        let ran = Rc::new(Cell::new(false));
        let ran2 = ran.clone();
        let task = RetryTask::new(move || ran2.set(true), |_| {});
        let armed = scheduler.try_schedule(1001, task).unwrap();
        assert!(!armed);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn overtake_replaces_armed_task_and_notifies_it() {
        let core = Core::new().unwrap();
        let (scheduler, _wc) = new_scheduler(&core, 10_000);

        let first_notified = Rc::new(Cell::new(None));
        let first_notified2 = first_notified.clone();
        let first = RetryTask::new(|| {}, move |cause| first_notified2.set(Some(cause)));
        assert!(scheduler.try_schedule(1000, first).unwrap());
        assert!(scheduler.is_armed());

        let second = RetryTask::new(|| {}, |_| {});
        assert!(scheduler.try_schedule(100, second).unwrap());

        assert_eq!(first_notified.get(), Some(RetryCause::RetryTaskOvertaken));
    }

    #[test]
    fn apply_minimum_backoff_reschedules_armed_task_instead_of_rejecting() {
        let core = Core::new().unwrap();
        let (scheduler, _wc) = new_scheduler(&core, 10_000);
        let task = RetryTask::new(|| {}, |_| {});
        assert!(scheduler.try_schedule(100, task).unwrap());

        // Overtake variant: raising the minimum backoff while armed
        // succeeds and reschedules, rather than erroring.
        assert!(scheduler
            .apply_minimum_backoff_millis_for_next_retry(5_000)
            .is_ok());
        assert!(scheduler.is_armed());
    }

    #[test]
    fn close_from_armed_notifies_cancelled() {
        let core = Core::new().unwrap();
        let (scheduler, _wc) = new_scheduler(&core, 10_000);
        let cause = Rc::new(Cell::new(None));
        let cause2 = cause.clone();
        let task = RetryTask::new(|| {}, move |c| cause2.set(Some(c)));
        assert!(scheduler.try_schedule(1000, task).unwrap());
        scheduler.close().unwrap();
        assert_eq!(cause.get(), Some(RetryCause::RetryTaskCancelled));
        assert!(scheduler.is_closed());
    }

    #[test]
    fn negative_minimum_backoff_clamped_to_zero() {
        let core = Core::new().unwrap();
        let (scheduler, _wc) = new_scheduler(&core, 10_000);
        assert!(scheduler
            .apply_minimum_backoff_millis_for_next_retry(-500)
            .is_ok());
        // Clamped to zero; a subsequent schedule of 0ms should still be
        // accepted (it does not push the minimum below zero).
        let task = RetryTask::new(|| {}, |_| {});
        assert!(scheduler.try_schedule(0, task).unwrap());
    }
}
