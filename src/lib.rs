//! Light-weight deferred promises.
//!
//! A producer gets a [`Deferred`] from [`defer`] and settles it once with
//! [`Deferred::resolve`] or [`Deferred::reject`]. Consumers attach handlers to
//! its [`Promise`] with [`Promise::then`] and [`Promise::catch`].
//!
//! ```
//! use iswear::{defer, resolved};
//! use std::{cell::Cell, rc::Rc};
//!
//! let deferred = defer::<i32, String>();
//! let seen = Rc::new(Cell::new(0));
//! let sink = seen.clone();
//! deferred
//!     .promise()
//!     .then(|n| resolved::<i32, String>(n + 10))
//!     .unwrap()
//!     .then(move |n| sink.set(n))
//!     .unwrap();
//! deferred.resolve(100).unwrap();
//! assert_eq!(seen.get(), 110);
//! ```
//!
//! Everything here is single threaded: handles are `Rc` based and handlers
//! run synchronously on the thread that settles the promise.

mod deferred;
mod promise;
mod settled;
mod swear;

pub use deferred::{defer, Deferred};
pub use promise::{rejected, resolved, Continuation, Outcome, Promise, Status};
pub use settled::Settled;
pub use swear::{resolvable, swearify, swearify_with, Callback};

/// Misuse of a promise. Rejection payloads never show up here, they travel as
/// the promise's own error type.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A success handler was already attached to this promise.
    #[error("Don't promise more than you can deliver...")]
    AlreadyPromised,
    /// A failure handler was already attached to this promise.
    #[error("Too strong of a fear of failure can be crippling")]
    FearOfFailure,
    /// The promise was already resolved or rejected.
    #[error("Don't promise more than you can deliver...")]
    AlreadySettled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
