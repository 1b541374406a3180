//! A single-assignment promise cell with a callback combinator algebra.
//!
//! A [`Promise`] starts pending and is settled exactly once, either fulfilled
//! with a value or rejected with a [`PromiseError`]. Consumers register
//! callbacks with [`Promise::on_success`] and [`Promise::on_failure`];
//! combinators ([`Promise::map`], [`Promise::flat_map`], [`Promise::recover`],
//! [`Promise::combine`], [`join`], [`invert`]) build new promises wired to
//! existing ones.
//!
//! The crate never spawns threads. Callbacks run on whichever thread settles a
//! promise, or on the registering thread if the promise had already settled and
//! finished running its queued callbacks.
//!
//! # Examples
//!
//! ```
//! use promise_cell::Promise;
//!
//! fn create_simple_promise() -> Promise<String> {
//!     Promise::new(|resolver| {
//!         resolver.fulfill(String::from("Hello World"));
//!     })
//! }
//!
//! let hello = create_simple_promise();
//! hello.on_success(|mesg| println!("{mesg}"));
//! ```
//!
//! Resolving from another thread, then chaining:
//!
//! ```
//! use promise_cell::{Promise, PromiseError};
//! use std::sync::mpsc::channel;
//! use std::thread;
//!
//! let (resolver, length) = Promise::<String>::pending();
//! let (tx, rx) = channel();
//! length
//!     .map(|s| s.len())
//!     .recover_value(|_err: PromiseError| 0)
//!     .on_success(move |n| tx.send(n).unwrap());
//! thread::spawn(move || resolver.fulfill("🍓🍓".into()));
//! assert_eq!(rx.recv().unwrap(), 8);
//! ```

pub mod combinators;
pub mod error;
pub mod future;
pub mod pair;
pub mod promise;

pub use combinators::{invert, join};
pub use error::{ErrorKind, Fault, PromiseError};
pub use future::PromiseFuture;
pub use pair::Pair;
pub use promise::{Promise, Resolver};
