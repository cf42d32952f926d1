//! Generic helpers over slices.
//!
//! Every helper walks the input front to back, calls the closure once per
//! element in that order, and returns a freshly allocated `Vec` (empty when
//! nothing matched).

/// Builds a new `Vec` from the result of `f` on every element.
pub fn map<T, U, F>(items: &[T], f: F) -> Vec<U>
where
    F: FnMut(&T) -> U,
{
    items.iter().map(f).collect()
}

/// Clones the elements for which `keep` returns `true`.
pub fn filter<T, F>(items: &[T], mut keep: F) -> Vec<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    items.iter().filter(|item| keep(*item)).cloned().collect()
}

/// Maps and filters in one pass: only the `Some` results of `f` are kept.
pub fn map_filter<T, U, F>(items: &[T], f: F) -> Vec<U>
where
    F: FnMut(&T) -> Option<U>,
{
    items.iter().filter_map(f).collect()
}

/// Calls `f` with every element and its index.
pub fn for_each<T, F>(items: &[T], mut f: F)
where
    F: FnMut(&T, usize),
{
    for (index, item) in items.iter().enumerate() {
        f(item, index);
    }
}

/// `true` if at least one element passes `test`. Stops at the first match.
pub fn some<T, F>(items: &[T], test: F) -> bool
where
    F: FnMut(&T) -> bool,
{
    items.iter().any(test)
}

/// `true` if every element passes `test`, including for an empty slice.
/// Stops at the first failure.
pub fn every<T, F>(items: &[T], test: F) -> bool
where
    F: FnMut(&T) -> bool,
{
    items.iter().all(test)
}

type Matcher<T1, T2> = Box<dyn Fn(&T1, &T2) -> bool + Send + Sync + 'static>;

/// Set-like difference and intersection between two slices whose element
/// types may differ, using a caller supplied notion of "same element".
///
/// # Examples
///
/// ```
/// use foundation_sync::slice::CompareHelper;
///
/// let by_id = CompareHelper::new(|user: &(u32, &'static str), id: &u32| user.0 == *id);
/// let users = [(1, "ada"), (2, "bob"), (3, "cy")];
///
/// assert_eq!(by_id.diff(&users, &[2]), vec![(1, "ada"), (3, "cy")]);
/// assert_eq!(by_id.intersect(&users, &[2, 9]), vec![(2, "bob")]);
/// ```
pub struct CompareHelper<T1, T2> {
    matches: Matcher<T1, T2>,
}

impl<T1, T2> CompareHelper<T1, T2> {
    /// `matches(a, b)` decides whether `a` from the left slice and `b`
    /// from the right slice count as the same element.
    #[must_use]
    pub fn new<F>(matches: F) -> Self
    where
        F: Fn(&T1, &T2) -> bool + Send + Sync + 'static,
    {
        Self {
            matches: Box::new(matches),
        }
    }

    fn found(&self, item: &T1, others: &[T2]) -> bool {
        others.iter().any(|other| (self.matches)(item, other))
    }

    /// Elements of `left` that match nothing in `right`, in `left` order.
    #[must_use]
    pub fn diff(&self, left: &[T1], right: &[T2]) -> Vec<T1>
    where
        T1: Clone,
    {
        left.iter()
            .filter(|item| !self.found(*item, right))
            .cloned()
            .collect()
    }

    /// Elements of `left` that match something in `right`, in `left`
    /// order. Duplicates in `left` are kept.
    #[must_use]
    pub fn intersect(&self, left: &[T1], right: &[T2]) -> Vec<T1>
    where
        T1: Clone,
    {
        left.iter()
            .filter(|item| self.found(*item, right))
            .cloned()
            .collect()
    }
}

impl<T1, T2> core::fmt::Debug for CompareHelper<T1, T2> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompareHelper").finish_non_exhaustive()
    }
}
