use crate::error::{attempt, panic_message, ErrorKind, PromiseError};
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

type SuccessCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
type FailureCallback = Box<dyn FnOnce(PromiseError) + Send + 'static>;

/// State of one cell.
///
/// A settled cell keeps a `draining` queue while its resolver is still running
/// callbacks. Registrations that arrive in that window are appended there, so
/// callbacks of one kind always fire in registration order. Once the resolver
/// finds the queue empty it clears it, and later registrations run inline.
enum Inner<T> {
    Pending {
        on_success: Vec<SuccessCallback<T>>,
        on_failure: Vec<FailureCallback>,
    },
    Fulfilled {
        value: T,
        draining: Option<Vec<SuccessCallback<T>>>,
    },
    Rejected {
        err: PromiseError,
        draining: Option<Vec<FailureCallback>>,
    },
}

impl<T> Inner<T> {
    fn success_backlog(&mut self) -> Option<&mut Option<Vec<SuccessCallback<T>>>> {
        match self {
            Inner::Fulfilled { draining, .. } => Some(draining),
            _ => None,
        }
    }

    fn failure_backlog(&mut self) -> Option<&mut Option<Vec<FailureCallback>>> {
        match self {
            Inner::Rejected { draining, .. } => Some(draining),
            _ => None,
        }
    }
}

/// A single-assignment cell that is either pending, fulfilled with a `T`, or
/// rejected with a [`PromiseError`].
///
/// `Promise` is a handle: clones share the same cell. Values are handed to
/// callbacks by clone, so every observer of a fulfilled promise receives its
/// own copy.
///
/// # Examples
///
/// ```
/// use promise_cell::Promise;
/// use std::sync::{Arc, Mutex};
///
/// let hello = Promise::new(|resolver| {
///     resolver.fulfill(String::from("Hello World"));
/// });
/// let seen = Arc::new(Mutex::new(None));
/// let slot = seen.clone();
/// hello.on_success(move |mesg| *slot.lock().unwrap() = Some(mesg));
/// assert_eq!(seen.lock().unwrap().as_deref(), Some("Hello World"));
/// ```
pub struct Promise<T> {
    promise: Arc<Mutex<Inner<T>>>,
}

/// The one-shot handle that moves a [`Promise`] out of its pending state.
///
/// A resolver may be cloned and sent to other threads. Only the first call to
/// [`resolve`](Resolver::resolve) (or its shorthands) across all clones has any
/// effect; every later call returns `false` and changes nothing.
pub struct Resolver<T> {
    promise: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// A promise that is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        Self {
            promise: Arc::new(Mutex::new(Inner::Fulfilled {
                value,
                draining: None,
            })),
        }
    }

    /// A promise that is already rejected with `err`.
    pub fn rejected(err: PromiseError) -> Self {
        Self {
            promise: Arc::new(Mutex::new(Inner::Rejected {
                err,
                draining: None,
            })),
        }
    }

    /// A pending promise together with the resolver that settles it.
    ///
    /// ```
    /// use promise_cell::Promise;
    /// use std::thread;
    ///
    /// let (resolver, promise) = Promise::<i32>::pending();
    /// assert!(promise.is_pending());
    /// thread::spawn(move || resolver.fulfill(42)).join().unwrap();
    /// assert!(promise.is_fulfilled());
    /// ```
    pub fn pending() -> (Resolver<T>, Self) {
        let promise = Arc::new(Mutex::new(Inner::Pending {
            on_success: Vec::new(),
            on_failure: Vec::new(),
        }));
        (
            Resolver {
                promise: promise.clone(),
            },
            Self { promise },
        )
    }

    /// Runs `ctor` right away with a fresh resolver for the returned promise.
    ///
    /// `ctor` may resolve synchronously, or keep the resolver and resolve later
    /// from any thread. If `ctor` panics before resolving, the promise is
    /// rejected with an [`ErrorKind::Construction`] error instead of being left
    /// pending.
    pub fn new<F>(ctor: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        let (resolver, promise) = Self::pending();
        let guard = resolver.clone();
        if let Err(err) = attempt(ErrorKind::Construction, move || ctor(resolver)) {
            guard.reject(err);
        }
        promise
    }

    /// Like [`Promise::new`], but an `Err` returned by `ctor` rejects the
    /// promise with that error, unless `ctor` already resolved it.
    ///
    /// ```
    /// use promise_cell::{Promise, PromiseError};
    ///
    /// let p = Promise::<u8>::try_new(|_resolver| Err(PromiseError::new("no input")));
    /// assert!(p.is_rejected());
    /// ```
    pub fn try_new<F>(ctor: F) -> Self
    where
        F: FnOnce(Resolver<T>) -> Result<(), PromiseError>,
    {
        let (resolver, promise) = Self::pending();
        let guard = resolver.clone();
        let outcome = attempt(ErrorKind::Construction, move || ctor(resolver));
        if let Err(err) = outcome.and_then(|r| r) {
            guard.reject(err);
        }
        promise
    }

    /// Registers a callback for fulfillment.
    ///
    /// On an already fulfilled promise `cb` runs immediately on the calling
    /// thread. On a rejected one it is dropped without running. Otherwise it is
    /// queued and runs exactly once, on the resolving thread, after every
    /// success callback registered before it.
    pub fn on_success<F>(&self, cb: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut promise = self.promise.lock();
        let value = match &mut *promise {
            Inner::Pending { on_success, .. }
            | Inner::Fulfilled {
                draining: Some(on_success),
                ..
            } => {
                on_success.push(Box::new(cb));
                return;
            }
            Inner::Fulfilled {
                value,
                draining: None,
            } => value.clone(),
            Inner::Rejected { .. } => return,
        };
        drop(promise);
        invoke(move || cb(value));
    }

    /// Registers a callback for rejection. Mirror image of
    /// [`on_success`](Promise::on_success).
    pub fn on_failure<F>(&self, cb: F)
    where
        F: FnOnce(PromiseError) + Send + 'static,
    {
        let mut promise = self.promise.lock();
        let err = match &mut *promise {
            Inner::Pending { on_failure, .. }
            | Inner::Rejected {
                draining: Some(on_failure),
                ..
            } => {
                on_failure.push(Box::new(cb));
                return;
            }
            Inner::Rejected {
                err,
                draining: None,
            } => err.clone(),
            Inner::Fulfilled { .. } => return,
        };
        drop(promise);
        invoke(move || cb(err));
    }
}

impl<T> Promise<T> {
    pub fn is_pending(&self) -> bool {
        matches!(*self.promise.lock(), Inner::Pending { .. })
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(*self.promise.lock(), Inner::Fulfilled { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(*self.promise.lock(), Inner::Rejected { .. })
    }
}

impl<T> Resolver<T>
where
    T: Clone + Send + 'static,
{
    /// Settles the promise with `outcome`. Returns `true` if this call did it,
    /// `false` if the promise had already been settled.
    ///
    /// The terminal state is swapped in under the cell lock, and the callbacks
    /// then run in registration order with the lock released. Callbacks
    /// registered from other threads before the drain finishes join the back
    /// of the queue and are run by this call too.
    ///
    /// The stored copy costs one clone of the value on top of the one handed
    /// to each callback.
    pub fn resolve(&self, outcome: Result<T, PromiseError>) -> bool {
        let mut promise = self.promise.lock();
        if !matches!(*promise, Inner::Pending { .. }) {
            trace!("promise already settled, ignoring resolution");
            return false;
        }
        // Built before the swap: a panicking `Clone` leaves the cell pending
        // with its queues intact.
        let settled = match &outcome {
            Ok(value) => Inner::Fulfilled {
                value: value.clone(),
                draining: Some(Vec::new()),
            },
            Err(err) => Inner::Rejected {
                err: err.clone(),
                draining: Some(Vec::new()),
            },
        };
        let Inner::Pending {
            on_success,
            on_failure,
        } = mem::replace(&mut *promise, settled)
        else {
            unreachable!("cell was checked to be pending under the same lock")
        };
        drop(promise);

        match outcome {
            Ok(value) => {
                trace!(callbacks = on_success.len(), "promise fulfilled");
                drop(on_failure);
                self.drain(on_success, Inner::success_backlog, |cb| {
                    invoke(|| cb(value.clone()))
                });
            }
            Err(err) => {
                trace!(callbacks = on_failure.len(), error = %err, "promise rejected");
                drop(on_success);
                self.drain(on_failure, Inner::failure_backlog, |cb| {
                    invoke(|| cb(err.clone()))
                });
            }
        }
        true
    }

    /// Runs `batch`, then keeps taking whatever was appended to the draining
    /// queue meanwhile. The queue is closed under the lock only once it is
    /// found empty.
    fn drain<C>(
        &self,
        mut batch: Vec<C>,
        backlog: fn(&mut Inner<T>) -> Option<&mut Option<Vec<C>>>,
        run: impl Fn(C),
    ) {
        loop {
            for cb in batch {
                run(cb);
            }
            let mut promise = self.promise.lock();
            let Some(draining) = backlog(&mut *promise) else {
                return;
            };
            let next = draining.as_mut().map(mem::take).unwrap_or_default();
            if next.is_empty() {
                *draining = None;
                return;
            }
            drop(promise);
            trace!(callbacks = next.len(), "running callbacks registered while draining");
            batch = next;
        }
    }

    pub fn fulfill(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    pub fn reject(&self, err: PromiseError) -> bool {
        self.resolve(Err(err))
    }
}

/// Runs a registered callback. A panic inside it, or in the clone of the value
/// handed to it, is logged and contained so it cannot starve the callbacks
/// queued after it.
fn invoke<F>(call: F)
where
    F: FnOnce(),
{
    if let Err(payload) = catch_unwind(AssertUnwindSafe(call)) {
        warn!(
            panic = %panic_message(payload.as_ref()),
            "promise callback panicked"
        );
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.promise.lock() {
            Inner::Pending {
                on_success,
                on_failure,
            } => f
                .debug_struct("Promise::Pending")
                .field("on_success", &on_success.len())
                .field("on_failure", &on_failure.len())
                .finish(),
            Inner::Fulfilled { value, .. } => {
                f.debug_tuple("Promise::Fulfilled").field(value).finish()
            }
            Inner::Rejected { err, .. } => f.debug_tuple("Promise::Rejected").field(err).finish(),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
