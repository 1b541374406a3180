//! Combinators over [`Promise`]. Everything here is built from
//! [`Promise::new`], [`Promise::on_success`] and [`Promise::on_failure`]; no
//! combinator touches a cell's internals.
//!
//! User functions never panic through a combinator: a panic becomes a rejection
//! of the promise the combinator returns, tagged with the [`ErrorKind`] of the
//! site that caught it.
use crate::error::{attempt, ErrorKind, PromiseError};
use crate::pair::Pair;
use crate::promise::{Promise, Resolver};
use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;
use tracing::trace;

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Converts a promise of a `T` into a promise of an `S`.
    ///
    /// A rejection passes through unchanged. If `f` panics the returned promise
    /// rejects with an [`ErrorKind::Transform`] error.
    ///
    /// ```
    /// use promise_cell::Promise;
    /// let p = Promise::fulfilled(5i32).map(|x| x.to_string());
    /// p.on_success(|s| assert_eq!(s, "5"));
    /// assert!(p.is_fulfilled());
    /// ```
    pub fn map<S, F>(&self, f: F) -> Promise<S>
    where
        S: Clone + Send + 'static,
        F: FnOnce(T) -> S + Send + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Like [`map`](Promise::map) for a fallible `f`: an `Err` rejects the
    /// returned promise with that error.
    pub fn try_map<S, F>(&self, f: F) -> Promise<S>
    where
        S: Clone + Send + 'static,
        F: FnOnce(T) -> Result<S, PromiseError> + Send + 'static,
    {
        let source = self.clone();
        Promise::new(move |resolver| {
            forward_failure(&source, &resolver);
            source.on_success(move |value| {
                let outcome = attempt(ErrorKind::Transform, move || f(value));
                resolver.resolve(outcome.and_then(|r| r));
            });
        })
    }

    /// Bind: chains a promise-returning `f` and adopts the outcome of the
    /// promise it returns. `f` is not called if `self` rejects.
    ///
    /// ```
    /// use promise_cell::Promise;
    /// let full = Promise::fulfilled(String::from("second"))
    ///     .flat_map(|b| Promise::new(move |r| { r.fulfill(format!("first, {b}")); }));
    /// full.on_success(|s| assert_eq!(s, "first, second"));
    /// assert!(full.is_fulfilled());
    /// ```
    pub fn flat_map<S, F>(&self, f: F) -> Promise<S>
    where
        S: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<S> + Send + 'static,
    {
        join(&self.map(f))
    }

    pub fn try_flat_map<S, F>(&self, f: F) -> Promise<S>
    where
        S: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Promise<S>, PromiseError> + Send + 'static,
    {
        join(&self.try_map(f))
    }

    /// If `self` rejects, hands the error to `f` to try to recover.
    ///
    /// A fulfilled `self` passes through and `f` is never called. `Some(p)`
    /// adopts the outcome of `p`; `None` keeps the original error. A panic in
    /// `f` rejects with an [`ErrorKind::Recovery`] error.
    pub fn recover<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(PromiseError) -> Option<Promise<T>> + Send + 'static,
    {
        let source = self.clone();
        Promise::new(move |resolver| {
            let passthrough = resolver.clone();
            source.on_success(move |value| {
                passthrough.fulfill(value);
            });
            source.on_failure(move |err| {
                match attempt(ErrorKind::Recovery, || f(err.clone())) {
                    Ok(Some(rescue)) => adopt(&rescue, resolver),
                    Ok(None) => {
                        trace!(error = %err, "recovery declined");
                        resolver.reject(err);
                    }
                    Err(fault) => {
                        resolver.reject(fault);
                    }
                }
            });
        })
    }

    /// Recovers with a plain value: a rejection becomes `f(error)`.
    ///
    /// ```
    /// use promise_cell::{Promise, PromiseError};
    /// let p = Promise::<usize>::rejected(PromiseError::new("uh oh"))
    ///     .recover_value(|err| err.message().len());
    /// p.on_success(|n| assert_eq!(n, 5));
    /// assert!(p.is_fulfilled());
    /// ```
    pub fn recover_value<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(PromiseError) -> T + Send + 'static,
    {
        self.recover(move |err| Some(Promise::fulfilled(f(err))))
    }

    /// Combines two promises of different types into a promise of a [`Pair`].
    ///
    /// Fulfills once both have fulfilled and rejects as soon as either rejects.
    /// When both reject, whichever failure is delivered first wins; if both are
    /// already rejected that is `self`'s.
    ///
    /// ```
    /// use promise_cell::Promise;
    /// let combo = Promise::fulfilled(5).combine(&Promise::fulfilled("some string"));
    /// combo.on_success(|pair| {
    ///     assert_eq!(*pair.first(), 5);
    ///     assert_eq!(*pair.second(), "some string");
    /// });
    /// assert!(combo.is_fulfilled());
    /// ```
    pub fn combine<B>(&self, other: &Promise<B>) -> Promise<Pair<T, B>>
    where
        B: Clone + Send + 'static,
    {
        let this = self.clone();
        let that = other.clone();
        Promise::new(move |resolver| {
            let slots: Arc<Mutex<(Option<T>, Option<B>)>> = Arc::new(Mutex::new((None, None)));
            forward_failure(&this, &resolver);
            forward_failure(&that, &resolver);

            let (first_slots, first_resolver) = (slots.clone(), resolver.clone());
            this.on_success(move |a| {
                let pair = {
                    let mut slots = first_slots.lock();
                    slots.0 = Some(a);
                    take_pair(&mut slots)
                };
                if let Some(pair) = pair {
                    first_resolver.fulfill(pair);
                }
            });
            that.on_success(move |b| {
                let pair = {
                    let mut slots = slots.lock();
                    slots.1 = Some(b);
                    take_pair(&mut slots)
                };
                if let Some(pair) = pair {
                    resolver.fulfill(pair);
                }
            });
        })
    }
}

impl<S> Promise<Promise<S>>
where
    S: Clone + Send + 'static,
{
    /// Method form of [`join`].
    pub fn flatten(&self) -> Promise<S> {
        join(self)
    }
}

/// Takes a promise of a promise and returns the promised promise.
///
/// ```
/// use promise_cell::{join, Promise};
/// let upper = Promise::fulfilled(Promise::fulfilled("gotcha"));
/// let lower = join(&upper);
/// lower.on_success(|s| assert_eq!(s, "gotcha"));
/// assert!(lower.is_fulfilled());
/// ```
pub fn join<S>(upper: &Promise<Promise<S>>) -> Promise<S>
where
    S: Clone + Send + 'static,
{
    let upper = upper.clone();
    Promise::new(move |resolver| {
        forward_failure(&upper, &resolver);
        upper.on_success(move |lower| adopt(&lower, resolver));
    })
}

/// Turns a collection of promises into a promise of a `Vec`.
///
/// Values are collected in completion order, not input order. Unless
/// `drop_failures` is set, the result rejects with the first failure recorded;
/// when several sources fail concurrently which one that is depends on who
/// takes the lock first. With `drop_failures`, failed sources are left out and
/// the result fulfills once every source has settled. An empty input fulfills
/// immediately with an empty `Vec`.
///
/// ```
/// use promise_cell::{invert, Promise};
/// let all = invert(vec![Promise::fulfilled(1), Promise::fulfilled(2)], false);
/// all.on_success(|mut v| {
///     v.sort();
///     assert_eq!(v, vec![1, 2]);
/// });
/// assert!(all.is_fulfilled());
/// ```
pub fn invert<T, I>(promises: I, drop_failures: bool) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |resolver| {
        if promises.is_empty() {
            resolver.fulfill(Vec::new());
            return;
        }
        let tally = Arc::new(Mutex::new(Tally {
            total: promises.len(),
            values: Vec::with_capacity(promises.len()),
            failures: Vec::new(),
            drop_failures,
            settled: false,
        }));
        for promise in &promises {
            let (ok_tally, ok_resolver) = (tally.clone(), resolver.clone());
            promise.on_success(move |value| {
                let outcome = {
                    let mut tally = ok_tally.lock();
                    tally.values.push(value);
                    tally.check()
                };
                if let Some(outcome) = outcome {
                    ok_resolver.resolve(outcome);
                }
            });
            let (err_tally, err_resolver) = (tally.clone(), resolver.clone());
            promise.on_failure(move |err| {
                let outcome = {
                    let mut tally = err_tally.lock();
                    tally.failures.push(err);
                    tally.check()
                };
                if let Some(outcome) = outcome {
                    err_resolver.resolve(outcome);
                }
            });
        }
    })
}

struct Tally<T> {
    total: usize,
    values: Vec<T>,
    failures: Vec<PromiseError>,
    drop_failures: bool,
    settled: bool,
}

impl<T> Tally<T> {
    /// Decides the aggregate outcome after one more source has settled.
    fn check(&mut self) -> Option<Result<Vec<T>, PromiseError>> {
        if self.settled {
            return None;
        }
        if !self.drop_failures {
            if let Some(first) = self.failures.first() {
                self.settled = true;
                return Some(Err(first.clone()));
            }
        }
        if self.values.len() + self.failures.len() == self.total {
            self.settled = true;
            if !self.failures.is_empty() {
                trace!(dropped = self.failures.len(), "dropping failed promises");
            }
            return Some(Ok(mem::take(&mut self.values)));
        }
        None
    }
}

fn forward_failure<T, U>(source: &Promise<T>, resolver: &Resolver<U>)
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let resolver = resolver.clone();
    source.on_failure(move |err| {
        resolver.reject(err);
    });
}

/// Settles `resolver` with whatever `source` settles with.
fn adopt<T>(source: &Promise<T>, resolver: Resolver<T>)
where
    T: Clone + Send + 'static,
{
    forward_failure(source, &resolver);
    source.on_success(move |value| {
        resolver.fulfill(value);
    });
}

fn take_pair<A, B>(slots: &mut (Option<A>, Option<B>)) -> Option<Pair<A, B>> {
    if slots.0.is_none() || slots.1.is_none() {
        return None;
    }
    Some(Pair::new(slots.0.take()?, slots.1.take()?))
}
