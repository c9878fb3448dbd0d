//! A virtual-clock stand-in for a host event loop.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use iswear::{defer, Promise};

type Task = Box<dyn FnOnce()>;

/// Timers run in order of due time, ties in order of scheduling. Time only
/// moves when `run` picks up the next timer.
#[derive(Default)]
pub struct EventLoop {
    now: Cell<u64>,
    seq: Cell<u64>,
    timers: RefCell<BTreeMap<(u64, u64), Task>>,
}

impl EventLoop {
    pub fn new() -> Rc<Self> {
        init_logging();
        Rc::new(Self::default())
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn set_timeout(&self, delay_ms: u64, task: impl FnOnce() + 'static) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers
            .borrow_mut()
            .insert((self.now.get() + delay_ms, seq), Box::new(task));
    }

    pub fn run(&self) {
        loop {
            let next = self.timers.borrow_mut().pop_first();
            match next {
                Some(((due, _), task)) => {
                    self.now.set(due);
                    task();
                }
                None => break,
            }
        }
    }
}

/// A promise resolved with `f()` once `delay_ms` has passed on `event_loop`.
pub fn promise_timeout<T, F>(event_loop: &EventLoop, delay_ms: u64, f: F) -> Promise<T, &'static str>
where
    T: 'static,
    F: FnOnce() -> T + 'static,
{
    let deferred = defer();
    let producer = deferred.clone();
    event_loop.set_timeout(delay_ms, move || producer.resolve(f()).unwrap());
    deferred.promise()
}

/// A promise rejected with `err` once `delay_ms` has passed on `event_loop`.
pub fn failing_timeout<T: 'static>(
    event_loop: &EventLoop,
    delay_ms: u64,
    err: &'static str,
) -> Promise<T, &'static str> {
    let deferred = defer();
    let producer = deferred.clone();
    event_loop.set_timeout(delay_ms, move || producer.reject(err).unwrap());
    deferred.promise()
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
