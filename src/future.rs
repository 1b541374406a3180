//! Awaiting a [`Promise`].
//!
//! The adapter registers one success and one failure callback that fill a
//! shared slot and wake whoever is polling. No thread or executor is created
//! here; a promise that is never resolved produces a future that never
//! completes.
use crate::error::PromiseError;
use crate::promise::Promise;
use parking_lot::Mutex;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Future returned by awaiting a [`Promise`].
///
/// # Examples
///
/// ```
/// use promise_cell::Promise;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let (resolver, promise) = Promise::<String>::pending();
/// let task = thread::spawn(move || block_on(async { promise.await }));
/// resolver.fulfill("Hi".into());
/// assert_eq!(task.join().expect("The task thread has panicked.").unwrap(), "Hi");
/// ```
#[derive(Debug)]
pub struct PromiseFuture<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<Result<T, PromiseError>>,
    waker: Option<Waker>,
}

impl<T> Slot<T> {
    fn fill(&mut self, value: Result<T, PromiseError>) -> Option<Waker> {
        self.value = Some(value);
        self.waker.take()
    }
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T, PromiseError>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let slot = Arc::new(Mutex::new(Slot {
            value: None,
            waker: None,
        }));
        let on_ok = slot.clone();
        self.on_success(move |value| {
            let waker = on_ok.lock().fill(Ok(value));
            if let Some(waker) = waker {
                waker.wake()
            }
        });
        let on_err = slot.clone();
        self.on_failure(move |err| {
            let waker = on_err.lock().fill(Err(err));
            if let Some(waker) = waker {
                waker.wake()
            }
        });
        PromiseFuture { slot }
    }
}

impl<T> Future for PromiseFuture<T> {
    type Output = Result<T, PromiseError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Promise, PromiseError};
    use futures::executor::block_on;
    use std::future::IntoFuture;
    use std::thread;

    #[test]
    fn test_await_fulfilled() {
        let p = Promise::fulfilled(5);
        assert_eq!(block_on(p.into_future()).unwrap(), 5);
    }

    #[test]
    fn test_await_rejected() {
        let p = Promise::<u8>::rejected(PromiseError::new("reject!!"));
        let err = block_on(async { p.await }).unwrap_err();
        assert_eq!(err.message(), "reject!!");
    }

    #[test]
    fn test_await_resolved_from_other_thread() {
        let (op, op_a) = Promise::<String>::pending();
        let task1 = thread::spawn(move || block_on(async { op_a.await }));
        let task2 = thread::spawn(move || op.fulfill(String::from("🍓")));
        assert!(task2.join().expect("The task2 thread has panicked"));
        let value = task1.join().expect("The task1 thread has panicked");
        assert_eq!(value.unwrap(), "🍓");
    }

    #[test]
    fn test_await_chain() {
        let (resolver, source) = Promise::<u32>::pending();
        let chained = source
            .map(|x| x + 1)
            .flat_map(|x| Promise::fulfilled(x * 10));
        let task = thread::spawn(move || block_on(async { chained.await }));
        resolver.fulfill(1);
        let value = task.join().expect("The task thread has panicked");
        assert_eq!(value.unwrap(), 20);
    }

    #[test]
    fn test_two_awaiters() {
        let (op, op_a) = Promise::<String>::pending();
        let op_b = op_a.clone();
        let task1 = thread::spawn(move || block_on(async { op_a.await }));
        let task2 = thread::spawn(move || block_on(async { op_b.await }));
        op.fulfill(String::from("🍓"));
        assert_eq!(task1.join().expect("The task1 thread has panicked").unwrap(), "🍓");
        assert_eq!(task2.join().expect("The task2 thread has panicked").unwrap(), "🍓");
    }
}
