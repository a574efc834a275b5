//! Event-loop-driven retry scheduler scenarios (see the library's
//! `SPEC_FULL.md` §8, scenario "ten tasks with decreasing delays").

extern crate armeria_client;
extern crate env_logger;
extern crate futures;
extern crate tacho;
extern crate tokio_core;
extern crate tokio_timer;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::Future;
use tokio_core::reactor::Core;
use tokio_timer::Timer;

use armeria_client::retry::{RetryScheduler, RetryTask};

#[test]
fn decreasing_delays_only_the_last_task_runs() {
    drop(env_logger::init());

    let mut core = Core::new().unwrap();
    let (scheduler, _when_closed) = RetryScheduler::new(
        core.handle(),
        Timer::default(),
        Instant::now() + Duration::from_secs(5),
        &tacho::new().0,
    );

    let ran = Rc::new(RefCell::new(Vec::new()));
    let overtaken = Rc::new(RefCell::new(0));

    for i in 0..10 {
        let delay_ms = (10 - i) * 20;
        let ran = ran.clone();
        let overtaken = overtaken.clone();
        let task = RetryTask::new(
            move || ran.borrow_mut().push(i),
            move |_cause| *overtaken.borrow_mut() += 1,
        );
        assert!(scheduler.try_schedule(delay_ms, task).unwrap());
    }

    // Let the last-armed task's timer fire.
    let settle = Timer::default().sleep(Duration::from_millis(250)).then(|_| Ok::<(), ()>(()));
    core.run(settle).unwrap();

    assert_eq!(*ran.borrow(), vec![9]);
    assert_eq!(*overtaken.borrow(), 9);
}

#[test]
fn task_beyond_deadline_is_rejected_and_never_runs() {
    let mut core = Core::new().unwrap();
    let (scheduler, _when_closed) = RetryScheduler::new(
        core.handle(),
        Timer::default(),
        Instant::now() + Duration::from_millis(50),
        &tacho::new().0,
    );

    let ran = Rc::new(RefCell::new(false));
    let ran2 = ran.clone();
    let task = RetryTask::new(move || *ran2.borrow_mut() = true, |_| {});

    assert!(!scheduler.try_schedule(500, task).unwrap());

    let settle = Timer::default().sleep(Duration::from_millis(100)).then(|_| Ok::<(), ()>(()));
    core.run(settle).unwrap();

    assert!(!*ran.borrow());
}
