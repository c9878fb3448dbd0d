//! Adapters from Node-style callback functions to promises.

use crate::deferred::Deferred;
use crate::{Promise, Result};

type Settle<T, E> = Box<dyn FnOnce(std::result::Result<T, E>) -> Result<()>>;

/// A Node-style completion callback, `(err, data)`. It can only be called
/// once.
pub struct Callback<T, E> {
    settle: Settle<T, E>,
}

impl<T, E> Callback<T, E> {
    /// `Some(err)` takes the failure path, otherwise `data` takes the success
    /// path.
    pub fn call(self, err: Option<E>, data: T) -> Result<()> {
        self.finish(match err {
            Some(err) => Err(err),
            None => Ok(data),
        })
    }

    /// Completes with a `Result`, for callers with no data to hand over on
    /// failure.
    pub fn finish(self, result: std::result::Result<T, E>) -> Result<()> {
        (self.settle)(result)
    }
}

impl<T, E> std::fmt::Debug for Callback<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Runs `op` with a [`Callback`] that routes an error to `failure` and data to
/// `success`.
pub fn resolvable<T, E, Op, Fail, Succ>(op: Op, failure: Fail, success: Succ)
where
    Op: FnOnce(Callback<T, E>),
    Fail: FnOnce(E) -> Result<()> + 'static,
    Succ: FnOnce(T) -> Result<()> + 'static,
{
    op(Callback {
        settle: Box::new(move |result| match result {
            Ok(data) => success(data),
            Err(err) => failure(err),
        }),
    })
}

/// Turns `f(args, callback)` into `g(args) -> Promise`.
///
/// Several arguments travel as a tuple. The promise is returned straight
/// away; it settles whenever `f` gets round to calling its callback.
///
/// # Examples
///
/// ```
/// use iswear::{swearify, Callback};
/// use std::{cell::RefCell, rc::Rc};
///
/// let node_style = |num: i32, callback: Callback<&'static str, &'static str>| {
///     let result = if num > 50 {
///         callback.call(None, "That's a big number!")
///     } else {
///         callback.finish(Err("Not big enough!"))
///     };
///     result.unwrap();
/// };
/// let promised = swearify(node_style);
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// promised(100).then(move |msg| sink.borrow_mut().push(msg)).unwrap();
/// let sink = seen.clone();
/// promised(10).catch(move |err| sink.borrow_mut().push(err)).unwrap();
///
/// assert_eq!(*seen.borrow(), vec!["That's a big number!", "Not big enough!"]);
/// ```
pub fn swearify<A, T, E, F>(f: F) -> impl Fn(A) -> Promise<T, E>
where
    F: Fn(A, Callback<T, E>),
    T: 'static,
    E: 'static,
{
    move |args| {
        let sworn = Deferred::new();
        let (on_err, on_data) = (sworn.clone(), sworn.clone());
        resolvable(
            |callback| f(args, callback),
            move |err| on_err.reject(err),
            move |data| on_data.resolve(data),
        );
        sworn.promise()
    }
}

/// [`swearify`] for functions that need a context, handed to `f` by
/// reference on every call.
pub fn swearify_with<C, A, T, E, F>(ctx: C, f: F) -> impl Fn(A) -> Promise<T, E>
where
    F: Fn(&C, A, Callback<T, E>),
    T: 'static,
    E: 'static,
{
    swearify(move |args, callback| f(&ctx, args, callback))
}
