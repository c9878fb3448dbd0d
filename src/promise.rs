//! The settlement state machine behind every [`Promise`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::deferred::Deferred;
use crate::{Error, Result};

/// Where a promise is in its life. `Resolved` and `Rejected` are terminal for
/// producers; only a late handler replays them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Waiting,
    Resolved,
    Rejected,
}

/// What a success handler hands back to the chain.
///
/// Only `Forward` settles the promise returned by [`Promise::then`]: the
/// nested promise's value or error is passed on once it arrives. A `Plain`
/// value is accepted and dropped, leaving the next link waiting.
pub enum Continuation<T, E> {
    Plain(T),
    Forward(Promise<T, E>),
}

/// Anything a success handler may return.
pub trait Outcome<E> {
    type Value;

    fn into_continuation(self) -> Continuation<Self::Value, E>;
}

impl<T, E> Outcome<E> for Continuation<T, E> {
    type Value = T;

    fn into_continuation(self) -> Continuation<T, E> {
        self
    }
}

impl<T, E> Outcome<E> for Promise<T, E> {
    type Value = T;

    fn into_continuation(self) -> Continuation<T, E> {
        Continuation::Forward(self)
    }
}

impl<E> Outcome<E> for () {
    type Value = ();

    fn into_continuation(self) -> Continuation<(), E> {
        Continuation::Plain(())
    }
}

pub(crate) type Later<T> = Box<dyn FnOnce(T) -> Result<()>>;
pub(crate) type Failure<E> = Box<dyn FnOnce(E) -> Result<()>>;

/// The chain link created by `then`, seen only through the one thing an
/// unhandled rejection needs from it.
pub(crate) trait Reject<E> {
    fn reject(&self, error: E) -> Result<()>;

    /// Detaches and returns the following link if this handle is the last one
    /// keeping its promise alive.
    fn unlink(&self) -> Option<Rc<dyn Reject<E>>>;
}

impl<T: 'static, E: 'static> Reject<E> for Deferred<T, E> {
    fn reject(&self, error: E) -> Result<()> {
        Deferred::reject(self, error)
    }

    fn unlink(&self) -> Option<Rc<dyn Reject<E>>> {
        self.promise().unlink()
    }
}

type Job = Box<dyn FnOnce() -> Result<()>>;

thread_local! {
    static PENDING: RefCell<Option<VecDeque<Job>>> = RefCell::new(None);
}

struct Draining;

impl Drop for Draining {
    fn drop(&mut self) {
        let _ = PENDING.try_with(|pending| *pending.borrow_mut() = None);
    }
}

/// Runs a handler invocation. Inside a settlement that is already running on
/// this thread the job is queued instead, and the outermost call drains the
/// queue before returning, so chains of any length settle in constant stack.
///
/// Every queued job runs; the first usage error is the one returned.
fn run_job(job: Job) -> Result<()> {
    let job = PENDING.with(|pending| match pending.borrow_mut().as_mut() {
        Some(queue) => {
            queue.push_back(job);
            None
        }
        None => Some(job),
    });
    let Some(job) = job else {
        return Ok(());
    };

    PENDING.with(|pending| *pending.borrow_mut() = Some(VecDeque::new()));
    let _draining = Draining;
    let mut outcome = job();
    while let Some(job) = PENDING.with(|pending| pending.borrow_mut().as_mut()?.pop_front()) {
        let result = job();
        if outcome.is_ok() {
            outcome = result;
        }
    }
    outcome
}

/// A handler slot that can be filled exactly once.
enum Handler<F> {
    Vacant,
    Armed(F),
    Spent,
}

impl<F> Handler<F> {
    fn is_vacant(&self) -> bool {
        matches!(self, Handler::Vacant)
    }

    /// Takes the handler out for invocation. The slot stays occupied.
    fn fire(&mut self) -> Option<F> {
        match std::mem::replace(self, Handler::Spent) {
            Handler::Armed(handler) => Some(handler),
            other => {
                *self = other;
                None
            }
        }
    }
}

enum Held<T, E> {
    Nothing,
    Value(T),
    Error(E),
}

impl<T, E> Held<T, E> {
    fn take_value(&mut self) -> Option<T> {
        match std::mem::replace(self, Held::Nothing) {
            Held::Value(value) => Some(value),
            other => {
                *self = other;
                None
            }
        }
    }

    fn take_error(&mut self) -> Option<E> {
        match std::mem::replace(self, Held::Nothing) {
            Held::Error(error) => Some(error),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct Inner<T, E> {
    status: Status,
    held: Held<T, E>,
    later: Handler<Later<T>>,
    failure: Handler<Failure<E>>,
    forward: Option<Rc<dyn Reject<E>>>,
}

impl<T, E> Drop for Inner<T, E> {
    // Chains are linked through `forward`; unlink them one at a time so a long
    // chain does not drop recursively.
    fn drop(&mut self) {
        let mut next = self.forward.take();
        self.later = Handler::Spent;
        self.failure = Handler::Spent;
        while let Some(link) = next {
            next = match Rc::strong_count(&link) {
                1 => link.unlink(),
                _ => None,
            };
        }
    }
}

/// A value of type `T` (or an error of type `E`) that arrives at most once.
///
/// Clones are handles onto the same promise. Each promise takes one success
/// handler and one failure handler in total, whichever handle they come from.
pub struct Promise<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("status", &self.inner.borrow().status)
            .finish_non_exhaustive()
    }
}

impl<T: 'static, E: 'static> Promise<T, E> {
    fn with(status: Status, held: Held<T, E>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                status,
                held,
                later: Handler::Vacant,
                failure: Handler::Vacant,
                forward: None,
            })),
        }
    }

    pub(crate) fn pending() -> Self {
        Self::with(Status::Waiting, Held::Nothing)
    }

    pub fn status(&self) -> Status {
        self.inner.borrow().status
    }

    fn unlink(&self) -> Option<Rc<dyn Reject<E>>> {
        // One count is this handle, one the link being torn down.
        if Rc::strong_count(&self.inner) > 2 {
            return None;
        }
        let mut inner = self.inner.try_borrow_mut().ok()?;
        let later = std::mem::replace(&mut inner.later, Handler::Spent);
        let failure = std::mem::replace(&mut inner.failure, Handler::Spent);
        let forward = inner.forward.take();
        drop(inner);
        drop((later, failure));
        forward
    }

    /// Attaches the success handler and returns the next promise in the chain.
    ///
    /// If this promise is already resolved, `success` runs before `then`
    /// returns. The returned promise settles only when `success` hands back a
    /// promise (see [`Continuation`]); a rejection of this promise with no
    /// failure handler attached is passed down to it.
    ///
    /// # Examples
    ///
    /// ```
    /// use iswear::{resolved, Error};
    ///
    /// let promise = resolved::<_, ()>(6);
    /// promise.then(|n| assert_eq!(n, 6)).unwrap();
    /// assert_eq!(promise.then(|_| ()).unwrap_err(), Error::AlreadyPromised);
    /// ```
    pub fn then<F, R>(&self, success: F) -> Result<Promise<R::Value, E>>
    where
        F: FnOnce(T) -> R + 'static,
        R: Outcome<E>,
        R::Value: 'static,
    {
        let forward = Deferred::new();
        let chained = forward.clone();
        let later: Later<T> =
            Box::new(move |data| spark(success(data).into_continuation(), &chained));
        self.attach_later(later, Some(Rc::new(forward.clone())))?;
        Ok(forward.promise())
    }

    /// `then(success)` plus `catch(failure)` on this same promise.
    ///
    /// With a failure handler attached, a rejection stops here and is not
    /// passed down to the returned promise.
    pub fn then_catch<F, R, G>(&self, success: F, failure: G) -> Result<Promise<R::Value, E>>
    where
        F: FnOnce(T) -> R + 'static,
        R: Outcome<E>,
        R::Value: 'static,
        G: FnOnce(E) + 'static,
    {
        let next = self.then(success)?;
        self.catch(failure)?;
        Ok(next)
    }

    /// Attaches the failure handler. If this promise is already rejected,
    /// `failure` runs before `catch` returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use iswear::{rejected, Error};
    ///
    /// let promise = rejected::<(), _>("Oh no!");
    /// promise.catch(|err| assert_eq!(err, "Oh no!")).unwrap();
    /// assert_eq!(promise.catch(|_| ()).unwrap_err(), Error::FearOfFailure);
    /// ```
    pub fn catch<G>(&self, failure: G) -> Result<()>
    where
        G: FnOnce(E) + 'static,
    {
        self.attach_failure(Box::new(move |error| {
            failure(error);
            Ok(())
        }))
    }

    pub(crate) fn attach_later(
        &self,
        later: Later<T>,
        forward: Option<Rc<dyn Reject<E>>>,
    ) -> Result<()> {
        let replay = {
            let mut inner = self.inner.borrow_mut();
            if !inner.later.is_vacant() {
                return Err(Error::AlreadyPromised);
            }
            inner.later = Handler::Armed(later);
            if forward.is_some() {
                inner.forward = forward;
            }
            match inner.status {
                Status::Resolved => inner.held.take_value(),
                _ => None,
            }
        };
        match replay {
            Some(data) => self.serve(data, true),
            None => Ok(()),
        }
    }

    pub(crate) fn attach_failure(&self, failure: Failure<E>) -> Result<()> {
        let replay = {
            let mut inner = self.inner.borrow_mut();
            if !inner.failure.is_vacant() {
                return Err(Error::FearOfFailure);
            }
            inner.failure = Handler::Armed(failure);
            match inner.status {
                Status::Rejected => inner.held.take_error(),
                _ => None,
            }
        };
        match replay {
            Some(error) => self.ditch(error, true),
            None => Ok(()),
        }
    }

    /// Resolves with `data`. `replay` skips the settle-once guard so a late
    /// `then` can deliver a value that is already known.
    pub(crate) fn serve(&self, data: T, replay: bool) -> Result<()> {
        let later = {
            let mut inner = self.inner.borrow_mut();
            if inner.status != Status::Waiting && !replay {
                return Err(Error::AlreadySettled);
            }
            inner.status = Status::Resolved;
            tracing::trace!(replay = replay, "promise resolved");
            match inner.later.fire() {
                Some(later) => later,
                None => {
                    tracing::debug!("no success handler yet, holding value");
                    inner.held = Held::Value(data);
                    return Ok(());
                }
            }
        };
        run_job(Box::new(move || later(data)))
    }

    /// Rejects with `error`, see [`Promise::serve`] for `replay`.
    pub(crate) fn ditch(&self, error: E, replay: bool) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.status != Status::Waiting && !replay {
                return Err(Error::AlreadySettled);
            }
            inner.status = Status::Rejected;
            tracing::trace!(replay = replay, "promise rejected");
        }
        self.extinguish(error)
    }

    fn extinguish(&self, error: E) -> Result<()> {
        let (failure, forward) = {
            let mut inner = self.inner.borrow_mut();
            match inner.failure.fire() {
                Some(failure) => (Some(failure), None),
                None => (None, inner.forward.clone()),
            }
        };
        if let Some(failure) = failure {
            return run_job(Box::new(move || failure(error)));
        }
        if let Some(forward) = forward {
            return run_job(Box::new(move || forward.reject(error)));
        }
        tracing::debug!("no failure handler or chain yet, holding error");
        self.inner.borrow_mut().held = Held::Error(error);
        Ok(())
    }
}

/// Settles `forward` from a nested promise. One level only: whatever the
/// nested promise delivers is passed on as is.
fn spark<T: 'static, E: 'static>(
    outcome: Continuation<T, E>,
    forward: &Deferred<T, E>,
) -> Result<()> {
    match outcome {
        Continuation::Plain(_) => {
            tracing::debug!("handler returned a plain value, chain left waiting");
            Ok(())
        }
        Continuation::Forward(nested) => {
            let resolve = forward.clone();
            let reject = forward.clone();
            nested.attach_later(Box::new(move |data| resolve.resolve(data)), None)?;
            nested.attach_failure(Box::new(move |error| reject.reject(error)))
        }
    }
}

/// A promise that is already resolved with `value`.
pub fn resolved<T: 'static, E: 'static>(value: T) -> Promise<T, E> {
    Promise::with(Status::Resolved, Held::Value(value))
}

/// A promise that is already rejected with `error`.
pub fn rejected<T: 'static, E: 'static>(error: E) -> Promise<T, E> {
    Promise::with(Status::Rejected, Held::Error(error))
}
