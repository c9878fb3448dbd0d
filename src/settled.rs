use std::cell::RefCell;
use std::rc::Rc;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use crate::{Promise, Result};

/// Waits for a [`Promise`] from `async` code. Made by [`Promise::settled`].
///
/// # Examples
///
/// ```
/// use iswear::defer;
/// use futures::executor::block_on;
///
/// let deferred = defer::<String, String>();
/// let settled = deferred.promise().settled().unwrap();
/// deferred.resolve(String::from("🍓")).unwrap();
/// assert_eq!(block_on(settled), Ok(String::from("🍓")));
/// ```
#[derive(Debug)]
pub struct Settled<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

#[derive(Debug)]
struct Inner<T, E> {
    value: Option<Result<T, E>>,
    waker: Option<Waker>,
}

impl<T, E> Inner<T, E> {
    fn fill(inner: &RefCell<Self>, value: Result<T, E>) {
        let waker = {
            let mut inner = inner.borrow_mut();
            inner.value = Some(value);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake()
        }
    }
}

impl<T: 'static, E: 'static> Promise<T, E> {
    /// Uses up this promise's success and failure handlers to feed a future.
    ///
    /// Awaiting a promise at the end of a chain whose last handler returned a
    /// plain value never completes, because that promise never settles.
    pub fn settled(&self) -> crate::Result<Settled<T, E>> {
        let inner = Rc::new(RefCell::new(Inner {
            value: None,
            waker: None,
        }));
        let on_value = Rc::clone(&inner);
        self.then(move |data| Inner::fill(&on_value, Ok(data)))?;
        let on_error = Rc::clone(&inner);
        self.catch(move |error| Inner::fill(&on_error, Err(error)))?;
        Ok(Settled { inner })
    }
}

impl<T, E> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{defer, rejected, resolved, Error};
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_settled_already_resolved() {
        let settled = resolved::<i32, ()>(42).settled().unwrap();
        assert_eq!(block_on(settled), Ok(42));
    }

    #[test]
    fn test_settled_already_rejected() {
        let settled = rejected::<(), _>("💥").settled().unwrap();
        assert_eq!(block_on(settled), Err("💥"));
    }

    #[test]
    fn test_settled_wakes_waiting_task() {
        let mut pool = LocalPool::new();
        let deferred = defer::<String, String>();
        let settled = deferred.promise().settled().unwrap();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        pool.spawner()
            .spawn_local(async move {
                *sink.borrow_mut() = Some(settled.await);
            })
            .unwrap();

        pool.run_until_stalled();
        assert!(seen.borrow().is_none());

        deferred.reject(String::from("reject!!")).unwrap();
        pool.run_until_stalled();
        assert_eq!(*seen.borrow(), Some(Err(String::from("reject!!"))));
    }

    #[test]
    fn test_settled_takes_both_handlers() {
        let promise = defer::<(), ()>().promise();
        let _settled = promise.settled().unwrap();
        assert_eq!(promise.then(|_| ()).unwrap_err(), Error::AlreadyPromised);
        assert_eq!(promise.catch(|_| ()).unwrap_err(), Error::FearOfFailure);
    }
}
