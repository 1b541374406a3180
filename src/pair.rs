/// The two values produced by [`Promise::combine`](crate::Promise::combine).
///
/// Read-only once built.
///
/// ```
/// use promise_cell::Pair;
/// let pair = Pair::new(5, "some string");
/// assert_eq!(*pair.first(), 5);
/// assert_eq!(*pair.second(), "some string");
/// let (a, b) = pair.into_inner();
/// assert_eq!((a, b), (5, "some string"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pair<A, B> {
    first: A,
    second: B,
}

impl<A, B> Pair<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    pub fn into_inner(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A, B> From<Pair<A, B>> for (A, B) {
    fn from(pair: Pair<A, B>) -> Self {
        pair.into_inner()
    }
}
