//! FILENAME: core/engine/src/query/ops.rs
//! PURPOSE: The composable operators. Each one owns its source and does no
//! work until it is pulled.
//! CONTEXT: `Reverse` and `Sort` are the only operators that materialize;
//! they drain their source on the first pull and then walk the buffer.
//! Nested sequences held by `FlatMap`/`Flatten` are owned, so abandoning the
//! outer sequence early simply drops whatever inner sequence was in flight.

use std::cmp::Ordering;
use std::hash::Hash;

use rustc_hash::FxHashSet;

use super::cursor::Cursor;
use super::{default_compare, Query};

// ============================================================================
// MAP / FILTER
// ============================================================================

pub struct Map<Q, F, U> {
    source: Q,
    f: F,
    cursor: Cursor<U>,
}

impl<Q, F, U> Map<Q, F, U> {
    pub(crate) fn new(source: Q, f: F) -> Self {
        Map {
            source,
            f,
            cursor: Cursor::new(),
        }
    }
}

impl<Q, F, U> Query for Map<Q, F, U>
where
    Q: Query,
    F: FnMut(Q::Item) -> U,
{
    type Item = U;

    fn cursor(&self) -> &Cursor<U> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<U> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<U> {
        let item = self.source.next_item()?;
        Some((self.f)(item))
    }
}

pub struct Filter<Q: Query, P> {
    source: Q,
    predicate: P,
    cursor: Cursor<Q::Item>,
}

impl<Q: Query, P> Filter<Q, P> {
    pub(crate) fn new(source: Q, predicate: P) -> Self {
        Filter {
            source,
            predicate,
            cursor: Cursor::new(),
        }
    }
}

impl<Q, P> Query for Filter<Q, P>
where
    Q: Query,
    P: FnMut(&Q::Item) -> bool,
{
    type Item = Q::Item;

    fn cursor(&self) -> &Cursor<Q::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Q::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<Q::Item> {
        while let Some(item) = self.source.next_item() {
            if (self.predicate)(&item) {
                return Some(item);
            }
        }
        None
    }
}

// ============================================================================
// FLATTENING
// ============================================================================

/// Expands every source item into a nested sequence and yields the nested
/// items in order.
pub struct FlatMap<Q, F, R: Query> {
    source: Q,
    f: F,
    inner: Option<R>,
    cursor: Cursor<R::Item>,
}

impl<Q, F, R: Query> FlatMap<Q, F, R> {
    pub(crate) fn new(source: Q, f: F) -> Self {
        FlatMap {
            source,
            f,
            inner: None,
            cursor: Cursor::new(),
        }
    }
}

impl<Q, F, R> Query for FlatMap<Q, F, R>
where
    Q: Query,
    R: Query,
    F: FnMut(Q::Item) -> R,
{
    type Item = R::Item;

    fn cursor(&self) -> &Cursor<R::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<R::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<R::Item> {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if let Some(item) = inner.next_item() {
                    return Some(item);
                }
                self.inner = None;
            }
            let outer = self.source.next_item()?;
            self.inner = Some((self.f)(outer));
        }
    }
}

pub struct Flatten<Q>
where
    Q: Query,
    Q::Item: Query,
{
    source: Q,
    inner: Option<Q::Item>,
    cursor: Cursor<<Q::Item as Query>::Item>,
}

impl<Q> Flatten<Q>
where
    Q: Query,
    Q::Item: Query,
{
    pub(crate) fn new(source: Q) -> Self {
        Flatten {
            source,
            inner: None,
            cursor: Cursor::new(),
        }
    }
}

impl<Q> Query for Flatten<Q>
where
    Q: Query,
    Q::Item: Query,
{
    type Item = <Q::Item as Query>::Item;

    fn cursor(&self) -> &Cursor<Self::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Self::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if let Some(item) = inner.next_item() {
                    return Some(item);
                }
                self.inner = None;
            }
            self.inner = Some(self.source.next_item()?);
        }
    }
}

// ============================================================================
// DISTINCT
// ============================================================================

/// Yields the first item seen for every key. Items whose key is `None` are
/// always yielded and never recorded.
pub struct Distinct<Q: Query, F, K> {
    source: Q,
    key: F,
    seen: FxHashSet<K>,
    cursor: Cursor<Q::Item>,
}

impl<Q: Query, F, K> Distinct<Q, F, K> {
    pub(crate) fn new(source: Q, key: F) -> Self {
        Distinct {
            source,
            key,
            seen: FxHashSet::default(),
            cursor: Cursor::new(),
        }
    }
}

impl<Q, F, K> Query for Distinct<Q, F, K>
where
    Q: Query,
    K: Eq + Hash,
    F: FnMut(&Q::Item) -> Option<K>,
{
    type Item = Q::Item;

    fn cursor(&self) -> &Cursor<Q::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Q::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<Q::Item> {
        while let Some(item) = self.source.next_item() {
            match (self.key)(&item) {
                None => return Some(item),
                Some(key) => {
                    if self.seen.insert(key) {
                        return Some(item);
                    }
                }
            }
        }
        None
    }
}

// ============================================================================
// SKIP / TAKE
// ============================================================================

pub struct Skip<Q: Query> {
    source: Q,
    remaining: usize,
    cursor: Cursor<Q::Item>,
}

impl<Q: Query> Skip<Q> {
    pub(crate) fn new(source: Q, count: usize) -> Self {
        Skip {
            source,
            remaining: count,
            cursor: Cursor::new(),
        }
    }
}

impl<Q: Query> Query for Skip<Q> {
    type Item = Q::Item;

    fn cursor(&self) -> &Cursor<Q::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Q::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<Q::Item> {
        while self.remaining > 0 {
            self.remaining -= 1;
            if !self.source.advance() {
                return None;
            }
        }
        self.source.next_item()
    }
}

/// Yields at most `count` items.
///
/// `usize::MAX` means unbounded: the operator then hands the source's own
/// cursor and items through, so it behaves as the source itself, and
/// `into_source` returns the source untouched.
pub struct Take<Q: Query> {
    source: Q,
    /// `None` when unbounded.
    remaining: Option<usize>,
    cursor: Cursor<Q::Item>,
}

impl<Q: Query> Take<Q> {
    pub(crate) fn new(source: Q, count: usize) -> Self {
        Take {
            source,
            remaining: (count != usize::MAX).then_some(count),
            cursor: Cursor::new(),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.remaining.is_none()
    }

    /// The wrapped source. For an unbounded take it carries the whole
    /// iteration state.
    pub fn into_source(self) -> Q {
        self.source
    }
}

impl<Q: Query> Query for Take<Q> {
    type Item = Q::Item;

    fn cursor(&self) -> &Cursor<Q::Item> {
        match self.remaining {
            None => self.source.cursor(),
            Some(_) => &self.cursor,
        }
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Q::Item> {
        match self.remaining {
            None => self.source.cursor_mut(),
            Some(_) => &mut self.cursor,
        }
    }

    fn produce(&mut self) -> Option<Q::Item> {
        match &mut self.remaining {
            None => self.source.produce(),
            Some(0) => None,
            Some(remaining) => {
                *remaining -= 1;
                self.source.next_item()
            }
        }
    }
}

// ============================================================================
// MATERIALIZING OPERATORS
// ============================================================================

fn drain<Q: Query>(mut source: Q) -> Vec<Q::Item> {
    let mut items = Vec::new();
    while let Some(item) = source.next_item() {
        items.push(item);
    }
    items
}

pub struct Reverse<Q: Query> {
    source: Option<Q>,
    buffer: Vec<Q::Item>,
    cursor: Cursor<Q::Item>,
}

impl<Q: Query> Reverse<Q> {
    pub(crate) fn new(source: Q) -> Self {
        Reverse {
            source: Some(source),
            buffer: Vec::new(),
            cursor: Cursor::new(),
        }
    }
}

impl<Q: Query> Query for Reverse<Q> {
    type Item = Q::Item;

    fn cursor(&self) -> &Cursor<Q::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Q::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<Q::Item> {
        if let Some(source) = self.source.take() {
            self.buffer = drain(source);
        }
        self.buffer.pop()
    }
}

/// Total order used by `Sort`.
pub trait SortComparer<T> {
    fn compare(&mut self, a: &T, b: &T) -> Ordering;
}

impl<T, F> SortComparer<T> for F
where
    F: FnMut(&T, &T) -> Ordering,
{
    fn compare(&mut self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

/// Orders items by an extracted key using the default comparer.
pub struct KeyComparer<F>(pub(crate) F);

impl<T, K, F> SortComparer<T> for KeyComparer<F>
where
    K: PartialOrd,
    F: FnMut(&T) -> K,
{
    fn compare(&mut self, a: &T, b: &T) -> Ordering {
        let ka = (self.0)(a);
        let kb = (self.0)(b);
        default_compare(&ka, &kb)
    }
}

/// Stable sort: items that compare equal keep their source order.
pub struct Sort<Q: Query, C> {
    source: Option<Q>,
    comparer: C,
    sorted: std::vec::IntoIter<Q::Item>,
    cursor: Cursor<Q::Item>,
}

impl<Q: Query, C> Sort<Q, C> {
    pub(crate) fn new(source: Q, comparer: C) -> Self {
        Sort {
            source: Some(source),
            comparer,
            sorted: Vec::new().into_iter(),
            cursor: Cursor::new(),
        }
    }
}

impl<Q, C> Query for Sort<Q, C>
where
    Q: Query,
    C: SortComparer<Q::Item>,
{
    type Item = Q::Item;

    fn cursor(&self) -> &Cursor<Q::Item> {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor<Q::Item> {
        &mut self.cursor
    }

    fn produce(&mut self) -> Option<Q::Item> {
        if let Some(source) = self.source.take() {
            let mut items = drain(source);
            let comparer = &mut self.comparer;
            // slice::sort_by is stable
            items.sort_by(|a, b| comparer.compare(a, b));
            self.sorted = items.into_iter();
        }
        self.sorted.next()
    }
}
