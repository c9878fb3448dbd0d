use crate::{Promise, Result};

/// The producer side of a [`Promise`]: it can settle the promise but not
/// listen to it.
///
/// # Examples
///
/// ```
/// use iswear::{defer, Error};
/// use std::{cell::Cell, rc::Rc};
///
/// let deferred = defer::<String, ()>();
/// let seen = Rc::new(Cell::new(false));
/// let flag = seen.clone();
/// deferred.promise().then(move |s| flag.set(s == "🍓")).unwrap();
///
/// deferred.resolve("🍓".into()).unwrap();
/// assert!(seen.get());
/// assert_eq!(deferred.resolve("🍓".into()), Err(Error::AlreadySettled));
/// ```
pub struct Deferred<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .finish()
    }
}

impl<T: 'static, E: 'static> Deferred<T, E> {
    /// A deferred over a fresh, waiting promise.
    pub fn new() -> Self {
        Self {
            promise: Promise::pending(),
        }
    }

    /// The consumer handle for this deferred.
    pub fn promise(&self) -> Promise<T, E> {
        self.promise.clone()
    }

    /// Settles the promise with `data`, running its success handler now if
    /// one is attached.
    pub fn resolve(&self, data: T) -> Result<()> {
        self.promise.serve(data, false)
    }

    /// Settles the promise with `error`. Without a failure handler the error
    /// goes to the next link of the chain, if there is one.
    pub fn reject(&self, error: E) -> Result<()> {
        self.promise.ditch(error, false)
    }
}

impl<T: 'static, E: 'static> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A fresh, waiting promise and the means to settle it.
pub fn defer<T: 'static, E: 'static>() -> Deferred<T, E> {
    Deferred::new()
}

#[cfg(test)]
mod tests {
    use super::defer;
    use crate::{Error, Status};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_deferred_resolve() {
        let deferred = defer::<String, ()>();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        deferred.promise().then(move |s| *sink.borrow_mut() = Some(s)).unwrap();
        assert_eq!(*seen.borrow(), None);

        deferred.resolve(String::from("🍓")).unwrap();
        assert_eq!(seen.borrow().as_deref(), Some("🍓"));
    }

    #[test]
    fn test_deferred_reject() {
        let deferred = defer::<(), String>();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        deferred.promise().catch(move |e| *sink.borrow_mut() = Some(e)).unwrap();

        deferred.reject("reject!!".into()).unwrap();
        assert_eq!(seen.borrow().as_deref(), Some("reject!!"));
        assert_eq!(deferred.promise().status(), Status::Rejected);
    }

    #[test]
    fn test_deferred_settles_once() {
        let deferred = defer::<i32, i32>();
        deferred.resolve(1).unwrap();
        assert_eq!(deferred.resolve(2), Err(Error::AlreadySettled));
        assert_eq!(deferred.reject(3), Err(Error::AlreadySettled));

        let deferred = defer::<i32, i32>();
        deferred.reject(1).unwrap();
        assert_eq!(deferred.reject(2), Err(Error::AlreadySettled));
        assert_eq!(deferred.resolve(3), Err(Error::AlreadySettled));
    }

    #[test]
    fn test_clones_share_one_promise() {
        let deferred = defer::<i32, ()>();
        let producer = deferred.clone();
        producer.resolve(4).unwrap();
        assert_eq!(deferred.promise().status(), Status::Resolved);
        assert_eq!(deferred.resolve(5), Err(Error::AlreadySettled));
    }
}
